/// Maximum damage regions for client-side tracking (ABI-stable)
pub const MAX_DAMAGE_REGIONS: usize = 8;

/// A rectangular damage region in buffer-local coordinates
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DamageRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32, // inclusive
    pub y1: i32, // inclusive
}

impl DamageRect {
    /// Create an invalid (empty) damage rect
    #[inline]
    pub const fn invalid() -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: -1,
            y1: -1,
        }
    }

    /// Check if this rect is valid (non-empty)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }

    /// Calculate the area of this rect
    #[inline]
    pub fn area(&self) -> i32 {
        if !self.is_valid() {
            0
        } else {
            (self.x1 - self.x0 + 1) * (self.y1 - self.y0 + 1)
        }
    }

    /// Compute the union (bounding box) of two rects
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Calculate what the area would be if merged with another rect
    #[inline]
    pub fn combined_area(&self, other: &Self) -> i32 {
        self.union(other).area()
    }

    /// Clip this rect to buffer bounds
    #[inline]
    pub fn clip(&self, width: i32, height: i32) -> Self {
        Self {
            x0: self.x0.max(0),
            y0: self.y0.max(0),
            x1: self.x1.min(width - 1),
            y1: self.y1.min(height - 1),
        }
    }

    /// Check if this rect intersects with another
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x0 <= other.x1 && self.x1 >= other.x0 && self.y0 <= other.y1 && self.y1 >= other.y0
    }
}

/// Maximum damage regions for internal/kernel tracking (higher resolution)
pub const MAX_INTERNAL_DAMAGE_REGIONS: usize = 32;

/// Server-side damage accumulator.
///
/// Keeps up to `MAX_INTERNAL_DAMAGE_REGIONS` disjoint rects; once that many
/// regions are pending, new damage is merged into whichever existing region
/// grows the least, same heuristic as most compositors use to bound the
/// region count without falling back to a single full-surface repaint.
#[derive(Clone, Copy, Debug)]
pub struct InternalDamageTracker {
    regions: [DamageRect; MAX_INTERNAL_DAMAGE_REGIONS],
    count: usize,
    full: bool,
}

impl InternalDamageTracker {
    pub const fn new() -> Self {
        Self {
            regions: [DamageRect::invalid(); MAX_INTERNAL_DAMAGE_REGIONS],
            count: 0,
            full: false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.full && self.count == 0
    }

    #[inline]
    pub fn set_full_damage(&mut self) {
        self.full = true;
        self.count = 0;
    }

    #[inline]
    pub fn clear(&mut self) {
        self.full = false;
        self.count = 0;
    }

    /// Add a damage rect, merging it with whichever existing region produces
    /// the smallest combined area if capacity is exhausted.
    pub fn add_merge_overlapping(&mut self, rect: DamageRect) {
        if self.full || !rect.is_valid() {
            return;
        }

        for existing in &mut self.regions[..self.count] {
            if existing.intersects(&rect) {
                *existing = existing.union(&rect);
                return;
            }
        }

        if self.count < MAX_INTERNAL_DAMAGE_REGIONS {
            self.regions[self.count] = rect;
            self.count += 1;
            return;
        }

        let mut best = 0usize;
        let mut best_growth = i64::MAX;
        for (i, existing) in self.regions.iter().enumerate() {
            let merged_area = existing.combined_area(&rect) as i64;
            let growth = merged_area - existing.area() as i64;
            if growth < best_growth {
                best_growth = growth;
                best = i;
            }
        }
        self.regions[best] = self.regions[best].union(&rect);
    }

    /// Export up to `N` regions for the client-facing ABI. Returns the array
    /// (unused slots zeroed) and a count; `u8::MAX` means "whole surface".
    pub fn export_to_array<const N: usize>(&self) -> ([DamageRect; N], u8) {
        let mut out = [DamageRect::default(); N];
        if self.full {
            return (out, u8::MAX);
        }
        let n = self.count.min(N);
        out[..n].copy_from_slice(&self.regions[..n]);
        (out, n as u8)
    }
}

impl Default for InternalDamageTracker {
    fn default() -> Self {
        Self::new()
    }
}
