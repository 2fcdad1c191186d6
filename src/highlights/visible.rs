//! Highlights materialized on the page being viewed

use super::geometry::Bounds;
use super::matcher;
use super::types::HighlightRegion;

/// Highlights currently drawn on one page.
///
/// Owns copies, never canonical data. Rebuilt from scratch on every page
/// change so replays are idempotent.
#[derive(Debug, Default, Clone)]
pub struct VisiblePageSet {
    page: Option<u32>,
    regions: Vec<HighlightRegion>,
}

impl VisiblePageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page the set was last replayed for
    pub fn page(&self) -> Option<u32> {
        self.page
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[HighlightRegion] {
        &self.regions
    }

    /// Drop every region and forget the page
    pub fn clear(&mut self) {
        self.page = None;
        self.regions.clear();
    }

    /// Clear and repopulate with the regions that sit on `page`
    pub fn replay<I>(&mut self, page: u32, regions: I)
    where
        I: IntoIterator<Item = HighlightRegion>,
    {
        self.clear();
        self.page = Some(page);
        for region in regions {
            if region.page == page {
                self.insert(region);
            }
        }
    }

    /// Add a region, replacing one with the same id in place
    pub fn insert(&mut self, region: HighlightRegion) {
        match self.regions.iter_mut().find(|r| r.id == region.id) {
            Some(existing) => *existing = region,
            None => self.regions.push(region),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<HighlightRegion> {
        let index = self.regions.iter().position(|r| r.id == id)?;
        Some(self.regions.remove(index))
    }

    /// Resolve a tapped rectangle to a drawn highlight
    pub fn tapped(&self, bounds: &Bounds) -> Option<&HighlightRegion> {
        matcher::find(&self.regions, bounds)
    }
}
