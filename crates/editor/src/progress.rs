/// Step indicator shown above each funnel page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunnelProgress {
    /// Zero-based index of the page being shown.
    pub current_page: usize,
    pub total_pages: usize,
}

impl FunnelProgress {
    pub fn new(current_page: usize, total_pages: usize) -> Self {
        Self {
            current_page,
            total_pages,
        }
    }

    /// Human-readable step counter, e.g. `Schritt 2 von 4`.
    pub fn label(&self) -> String {
        format!("Schritt {} von {}", self.step(), self.total_pages)
    }

    /// Completed share in whole percent, rounded half up and capped at 100.
    pub fn percent(&self) -> u32 {
        if self.total_pages == 0 {
            return 0;
        }
        let step = self.step().min(self.total_pages);
        ((step * 100 + self.total_pages / 2) / self.total_pages) as u32
    }

    pub fn is_last(&self) -> bool {
        self.step() >= self.total_pages
    }

    fn step(&self) -> usize {
        self.current_page + 1
    }
}
