use pedal_protocol::Bank;
use tracing::warn;

/// Bank/preset navigation state. The bank list is fetched once at startup and
/// never mutated; the cursor always points at the bank the next `advance`
/// will activate.
pub struct BankNavigator {
    banks: Vec<Bank>,
    cursor: usize,
}

impl BankNavigator {
    pub fn new(banks: Vec<Bank>) -> Self {
        if banks.is_empty() {
            warn!("engine reported no banks; navigation is disabled");
        }
        Self { banks, cursor: 0 }
    }

    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Activates the bank under the cursor and steps past it (wrapping).
    /// Returns the `setpreset` target: the bank and its first preset. `None`
    /// when there are no banks, or when the bank under the cursor has no
    /// presets (it is stepped over without an announcement).
    pub fn advance(&mut self) -> Option<(String, String)> {
        if self.banks.is_empty() {
            return None;
        }
        let bank = &self.banks[self.cursor];
        self.cursor = (self.cursor + 1) % self.banks.len();
        let preset = bank.presets.first()?;
        Some((bank.name.clone(), preset.clone()))
    }

    /// Activates the bank before the one activated last. Steps the cursor
    /// back by two (wrapping) so that the activation, which itself steps
    /// forward, lands one bank behind.
    pub fn retreat(&mut self) -> Option<(String, String)> {
        let n = self.banks.len();
        if n == 0 {
            return None;
        }
        self.cursor = (self.cursor + n * 2 - 2) % n;
        self.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(name: &str, presets: &[&str]) -> Bank {
        Bank {
            name: name.to_string(),
            presets: presets.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn three_banks() -> BankNavigator {
        BankNavigator::new(vec![
            bank("A", &["a1", "a2"]),
            bank("B", &["b1"]),
            bank("C", &["c1"]),
        ])
    }

    #[test]
    fn advance_walks_banks_in_order_and_wraps() {
        let mut nav = three_banks();
        assert_eq!(nav.advance(), Some(("A".into(), "a1".into())));
        assert_eq!(nav.advance(), Some(("B".into(), "b1".into())));
        assert_eq!(nav.advance(), Some(("C".into(), "c1".into())));
        assert_eq!(nav.advance(), Some(("A".into(), "a1".into())));
    }

    #[test]
    fn n_advances_return_cursor_to_start() {
        let mut nav = three_banks();
        let start = nav.cursor();
        for _ in 0..3 {
            nav.advance();
        }
        assert_eq!(nav.cursor(), start);
    }

    #[test]
    fn retreat_cancels_the_last_advance() {
        let mut nav = three_banks();
        let first = nav.advance();
        nav.advance();
        // Two steps forward, one back: the retreat re-activates where the
        // first advance left us, one bank behind the latest activation.
        assert_eq!(nav.retreat(), first);
    }

    #[test]
    fn retreat_from_start_wraps_to_last_bank() {
        let mut nav = three_banks();
        nav.advance(); // activates A, cursor now at B
        assert_eq!(nav.retreat(), Some(("C".into(), "c1".into())));
    }

    #[test]
    fn single_bank_always_reactivates_itself() {
        let mut nav = BankNavigator::new(vec![bank("FOO", &["p1", "p2"])]);
        assert_eq!(nav.advance(), Some(("FOO".into(), "p1".into())));
        assert_eq!(nav.cursor(), 0);
        assert_eq!(nav.advance(), Some(("FOO".into(), "p1".into())));
        assert_eq!(nav.retreat(), Some(("FOO".into(), "p1".into())));
    }

    #[test]
    fn empty_bank_list_never_announces() {
        let mut nav = BankNavigator::new(Vec::new());
        assert_eq!(nav.advance(), None);
        assert_eq!(nav.retreat(), None);
    }

    #[test]
    fn bank_without_presets_is_stepped_over_silently() {
        let mut nav = BankNavigator::new(vec![bank("EMPTY", &[]), bank("B", &["b1"])]);
        assert_eq!(nav.advance(), None);
        assert_eq!(nav.advance(), Some(("B".into(), "b1".into())));
    }
}
