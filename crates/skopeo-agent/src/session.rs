/// Whether pointer events drive selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InspectMode {
    #[default]
    Active,
    Inactive,
}

impl InspectMode {
    pub fn from_flag(active: bool) -> Self {
        if active { Self::Active } else { Self::Inactive }
    }
}

/// Live state of one agent instance: mode, hover target, current selection
/// and pending timers.
///
/// Timers are plain deadlines in epoch milliseconds; whoever owns the clock
/// drains the expired ones.
#[derive(Debug, Clone)]
pub struct Session<N> {
    mode: InspectMode,
    hovered: Option<N>,
    selection: Option<N>,
    transient: Vec<(N, i64)>,
    media_scan_at: Option<i64>,
}

impl<N> Default for Session<N> {
    fn default() -> Self {
        Self {
            mode: InspectMode::default(),
            hovered: None,
            selection: None,
            transient: Vec::new(),
            media_scan_at: None,
        }
    }
}

impl<N: Clone + PartialEq> Session<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InspectMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == InspectMode::Active
    }

    pub fn set_mode(&mut self, mode: InspectMode) {
        self.mode = mode;
    }

    pub fn hovered(&self) -> Option<&N> {
        self.hovered.as_ref()
    }

    /// Records the new hover target, returning the previous one.
    pub fn replace_hovered(&mut self, node: N) -> Option<N> {
        self.hovered.replace(node)
    }

    pub fn selection(&self) -> Option<&N> {
        self.selection.as_ref()
    }

    pub fn select(&mut self, node: N) {
        self.selection = Some(node);
    }

    /// Schedules removal of a transient highlight. A node already pending
    /// gets its deadline pushed back.
    pub fn schedule_transient(&mut self, node: N, deadline: i64) {
        match self.transient.iter_mut().find(|(pending, _)| *pending == node) {
            Some((_, existing)) => *existing = deadline,
            None => self.transient.push((node, deadline)),
        }
    }

    pub fn pending_transients(&self) -> usize {
        self.transient.len()
    }

    /// Removes and returns every transient highlight whose deadline has passed.
    pub fn take_expired(&mut self, now: i64) -> Vec<N> {
        let mut expired = Vec::new();
        self.transient.retain(|(node, deadline)| {
            if *deadline <= now {
                expired.push(node.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn schedule_media_scan(&mut self, at: i64) {
        self.media_scan_at = Some(at);
    }

    /// True exactly once, on the first call at or after the scheduled time.
    pub fn take_due_media_scan(&mut self, now: i64) -> bool {
        match self.media_scan_at {
            Some(at) if at <= now => {
                self.media_scan_at = None;
                true
            }
            _ => false,
        }
    }
}
