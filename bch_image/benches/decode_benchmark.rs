use bch_image::Image;
use criterion::{criterion_group, criterion_main, Criterion};

fn fixture_path() -> &'static std::path::Path {
    std::path::Path::new("../tests/mini.img")
}

fn open_fixture() -> Option<Image> {
    if !fixture_path().exists() {
        return None;
    }
    Image::open(fixture_path()).ok()
}

fn bench_open(c: &mut Criterion) {
    if open_fixture().is_none() {
        eprintln!("Skipping benchmarks - mini.img not found");
        return;
    }

    c.bench_function("bch_image_open", |b| {
        b.iter(|| {
            let _image = Image::open(fixture_path()).unwrap();
        })
    });
}

fn bench_iter_extents(c: &mut Criterion) {
    let image = match open_fixture() {
        Some(i) => i,
        None => return,
    };

    c.bench_function("bch_image_iter_extents", |b| {
        b.iter(|| {
            let extents = image.iter_extents().unwrap();
            let _count = extents.filter_map(Result::ok).count();
        })
    });
}

fn bench_iter_inodes(c: &mut Criterion) {
    let image = match open_fixture() {
        Some(i) => i,
        None => return,
    };

    c.bench_function("bch_image_iter_inodes", |b| {
        b.iter(|| {
            let inodes = image.iter_inodes().unwrap();
            let _count = inodes.filter_map(Result::ok).count();
        })
    });
}

fn bench_iter_dirents(c: &mut Criterion) {
    let image = match open_fixture() {
        Some(i) => i,
        None => return,
    };

    c.bench_function("bch_image_iter_dirents", |b| {
        b.iter(|| {
            let dirents = image.iter_dirents().unwrap();
            let _count = dirents.filter_map(Result::ok).count();
        })
    });
}

fn bench_find_inode(c: &mut Criterion) {
    let image = match open_fixture() {
        Some(i) => i,
        None => return,
    };

    c.bench_function("bch_image_find_inode", |b| {
        b.iter(|| {
            let _inode = image.find_inode(bch_image::ROOT_INODE).unwrap();
        })
    });
}

fn bench_find_dirent(c: &mut Criterion) {
    let image = match open_fixture() {
        Some(i) => i,
        None => return,
    };

    c.bench_function("bch_image_find_dirent", |b| {
        b.iter(|| {
            let _dirent = image.find_dirent(bch_image::ROOT_INODE, 0, b"").unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_open,
    bench_iter_extents,
    bench_iter_inodes,
    bench_iter_dirents,
    bench_find_inode,
    bench_find_dirent,
);
criterion_main!(benches);
