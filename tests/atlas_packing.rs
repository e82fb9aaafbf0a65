use umbra::pool::atlas::{AtlasPacker, AtlasRect};

fn overlaps(a: &AtlasRect, b: &AtlasRect) -> bool {
    a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
}

fn assert_disjoint(rects: &[AtlasRect]) {
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            assert!(!overlaps(a, b), "{a:?} overlaps {b:?}");
        }
    }
}

#[test]
fn uniform_requests_fill_to_exact_capacity() {
    for (atlas, size) in [(512u32, 64u32), (1024, 128), (2048, 512)] {
        let capacity = (atlas / size) * (atlas / size);
        let mut packer = AtlasPacker::default();
        packer.reset(atlas);

        let mut rects = Vec::new();
        for i in 0..capacity {
            let rect = packer.insert(size, i);
            assert!(rect.has_area(), "request {i}/{capacity} should fit a {atlas} atlas");
            assert_eq!(rect.width, size);
            assert!(rect.x + rect.width <= atlas && rect.y + rect.height <= atlas);
            rects.push(rect);
        }
        assert_disjoint(&rects);
        assert!(!packer.insert(size, capacity).has_area(), "the atlas should be exhausted");
    }
}

#[test]
fn descending_mixed_sizes_stay_disjoint() {
    let mut packer = AtlasPacker::default();
    packer.reset(1024);

    let sizes = [512u32, 256, 256, 256, 128, 128, 64, 64, 64, 64];
    let mut rects = Vec::new();
    for (i, &size) in sizes.iter().enumerate() {
        let rect = packer.insert(size, i as u32);
        assert!(rect.has_area());
        assert_eq!(rect.width, size);
        rects.push(rect);
    }
    assert_disjoint(&rects);
}

#[test]
fn placements_are_deterministic() {
    let run = || {
        let mut packer = AtlasPacker::default();
        packer.reset(1024);
        [packer.insert(256, 0), packer.insert(64, 1), packer.insert(128, 2), packer.insert(64, 3)]
    };
    assert_eq!(run(), run());
}

#[test]
fn overflow_affects_only_the_failing_request() {
    let mut packer = AtlasPacker::default();
    packer.reset(512);

    assert!(packer.insert(512, 0).has_area());
    assert!(!packer.insert(64, 1).has_area());

    packer.reset(512);
    let rect = packer.insert(64, 0);
    assert!(rect.has_area(), "a fresh frame reclaims the whole atlas");
}
