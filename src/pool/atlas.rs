/// Rectangle inside the shadow atlas, in texels. A zero-area rect means the
/// request did not fit this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

const NO_CHILD: u16 = u16::MAX;
const FREE: u32 = u32::MAX;

/// Quadtree node. A cell is either a leaf (allocated or free) or has exactly
/// four children covering its quadrants.
#[derive(Debug, Clone, Copy)]
struct AtlasCell {
    rect: AtlasRect,
    children: [u16; 4],
    data_index: u32,
}

impl AtlasCell {
    fn new(rect: AtlasRect) -> Self {
        Self { rect, children: [NO_CHILD; 4], data_index: FREE }
    }

    fn is_leaf(&self) -> bool {
        self.children == [NO_CHILD; 4]
    }
}

/// Arena-backed quadtree packer over one square power-of-two atlas. The tree
/// is rebuilt from a single root every frame; cells are appended and never
/// freed within a frame. Child links are 16-bit, which caps the arena at
/// 65535 cells per frame.
#[derive(Debug, Default)]
pub struct AtlasPacker {
    cells: Vec<AtlasCell>,
}

impl AtlasPacker {
    /// Drops last frame's tree and starts over with a root covering the
    /// whole atlas.
    pub fn reset(&mut self, atlas_size: u32) {
        self.cells.clear();
        self.cells.push(AtlasCell::new(AtlasRect { x: 0, y: 0, width: atlas_size, height: atlas_size }));
    }

    /// Finds a free spot for a `size`x`size` map and marks it with
    /// `data_index`. Returns a zero-area rect when the atlas is exhausted;
    /// that is a per-frame, per-light degradation, not an error.
    pub fn insert(&mut self, size: u32, data_index: u32) -> AtlasRect {
        debug_assert!(size.is_power_of_two(), "shadow map size must be a power of two");
        debug_assert!(!self.cells.is_empty(), "reset() must run before insert()");
        match self.insert_into(0, size, data_index) {
            Some(cell) => self.cells[cell as usize].rect,
            None => AtlasRect::default(),
        }
    }

    fn insert_into(&mut self, cell_index: u16, size: u32, data_index: u32) -> Option<u16> {
        let cell = self.cells[cell_index as usize];
        if !cell.is_leaf() {
            for child in cell.children {
                if let Some(found) = self.insert_into(child, size, data_index) {
                    return Some(found);
                }
            }
            return None;
        }

        if cell.data_index != FREE {
            return None;
        }
        if cell.rect.width < size || cell.rect.height < size {
            return None;
        }
        if cell.rect.width == size && cell.rect.height == size {
            self.cells[cell_index as usize].data_index = data_index;
            return Some(cell_index);
        }

        // Split into quadrants and retry in the first one.
        if self.cells.len() + 4 > NO_CHILD as usize {
            return None;
        }
        let base = self.cells.len() as u16;
        let x = cell.rect.x;
        let y = cell.rect.y;
        let w = cell.rect.width / 2;
        let h = cell.rect.height / 2;
        self.cells.push(AtlasCell::new(AtlasRect { x, y, width: w, height: h }));
        self.cells.push(AtlasCell::new(AtlasRect { x: x + w, y, width: w, height: h }));
        self.cells.push(AtlasCell::new(AtlasRect { x, y: y + h, width: w, height: h }));
        self.cells.push(AtlasCell::new(AtlasRect { x: x + w, y: y + h, width: w, height: h }));
        self.cells[cell_index as usize].children = [base, base + 1, base + 2, base + 3];
        self.insert_into(base, size, data_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &AtlasRect, b: &AtlasRect) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    #[test]
    fn exact_fit_takes_the_whole_atlas() {
        let mut packer = AtlasPacker::default();
        packer.reset(512);
        let rect = packer.insert(512, 0);
        assert_eq!(rect, AtlasRect { x: 0, y: 0, width: 512, height: 512 });
        assert!(!packer.insert(8, 1).has_area());
    }

    #[test]
    fn fills_to_capacity_without_overlap() {
        let mut packer = AtlasPacker::default();
        packer.reset(1024);
        let mut rects = Vec::new();
        for i in 0..16 {
            let rect = packer.insert(256, i);
            assert!(rect.has_area(), "request {i} should fit");
            rects.push(rect);
        }
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert!(!overlaps(a, b));
            }
        }
        assert!(!packer.insert(256, 16).has_area());
    }

    #[test]
    fn mixed_sizes_pack_first_fit() {
        let mut packer = AtlasPacker::default();
        packer.reset(1024);
        let big = packer.insert(512, 0);
        let small_a = packer.insert(128, 1);
        let small_b = packer.insert(128, 2);
        assert_eq!(big, AtlasRect { x: 0, y: 0, width: 512, height: 512 });
        assert_eq!(small_a, AtlasRect { x: 512, y: 0, width: 128, height: 128 });
        assert_eq!(small_b, AtlasRect { x: 640, y: 0, width: 128, height: 128 });
    }

    #[test]
    fn oversized_request_overflows() {
        let mut packer = AtlasPacker::default();
        packer.reset(128);
        assert!(!packer.insert(256, 0).has_area());
    }

    #[test]
    fn reset_reclaims_everything() {
        let mut packer = AtlasPacker::default();
        packer.reset(256);
        assert!(packer.insert(256, 0).has_area());
        packer.reset(256);
        assert!(packer.insert(256, 0).has_area());
    }
}
