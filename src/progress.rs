/// Whole-number percentage of `current` out of `total`, rounded down.
pub fn percent_complete(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (current.min(total) * 100 / total) as u8
}

/// Progress bar state for one playlist run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistProgress {
    pub name: String,
    pub current: usize,
    pub total: usize,
    pub percent: u8,
}

impl PlaylistProgress {
    pub fn label(&self) -> String {
        format!("{}: {}/{} videos", self.name, self.current, self.total)
    }

    pub fn fraction(&self) -> f32 {
        f32::from(self.percent) / 100.0
    }
}

/// Per-playlist progress rows keyed by display name, in the order the
/// playlists started. Owned by the UI thread only.
#[derive(Default)]
pub struct ProgressBoard {
    rows: Vec<PlaylistProgress>,
}

impl ProgressBoard {
    /// Adds a fresh row; a stale row with the same name is replaced.
    pub fn start(&mut self, name: &str, total: usize) {
        self.rows.retain(|row| row.name != name);
        self.rows.push(PlaylistProgress {
            name: name.to_string(),
            current: 0,
            total,
            percent: 0,
        });
    }

    /// Applies a progress update. Unknown names are ignored.
    pub fn update(&mut self, name: &str, current: usize, total: usize, percent: u8) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.name == name) {
            row.current = current;
            row.total = total;
            row.percent = percent;
        }
    }

    pub fn rows(&self) -> &[PlaylistProgress] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_monotonic_and_ends_at_100() {
        let total = 7;
        let values: Vec<u8> = (1..=total).map(|i| percent_complete(i, total)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&100));
        assert_eq!(values[0], 14);
        assert_eq!(percent_complete(0, 0), 0);
    }

    #[test]
    fn restarting_a_name_replaces_the_row() {
        let mut board = ProgressBoard::default();
        board.start("Mix", 4);
        board.start("Other", 2);
        board.update("Mix", 2, 4, 50);
        board.start("Mix", 9);

        let names: Vec<&str> = board.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Other", "Mix"]);
        let mix = &board.rows()[1];
        assert_eq!((mix.current, mix.total, mix.percent), (0, 9, 0));
        assert_eq!(mix.label(), "Mix: 0/9 videos");
    }

    #[test]
    fn updates_for_unknown_rows_are_dropped() {
        let mut board = ProgressBoard::default();
        board.update("ghost", 1, 1, 100);
        assert!(board.rows().is_empty());
    }
}
