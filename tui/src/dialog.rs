use market_core::model::Amount;

/// What a dialog is collecting. Each kind produces a typed outcome, so
/// flows are testable without a terminal and nothing ever blocks on a
/// native prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Bid { minimum: Amount },
    Contact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    BidConfirmed(Amount),
    ContactConfirmed(String),
    Cancelled,
}

/// Keys the dialog understands; the terminal layer maps crossterm events
/// onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKey {
    Char(char),
    Backspace,
    Enter,
    Esc,
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub kind: DialogKind,
    pub input: String,
    pub error: Option<String>,
}

impl Dialog {
    pub fn bid(minimum: Amount) -> Self {
        Self {
            kind: DialogKind::Bid { minimum },
            input: String::new(),
            error: None,
        }
    }

    pub fn contact() -> Self {
        Self {
            kind: DialogKind::Contact,
            input: String::new(),
            error: None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            DialogKind::Bid { .. } => "Place bid",
            DialogKind::Contact => "Start conversation",
        }
    }

    pub fn hint(&self) -> String {
        match self.kind {
            DialogKind::Bid { minimum } => format!("minimum {}", minimum),
            DialogKind::Contact => "user id".to_string(),
        }
    }

    /// Feed one key; `Some(outcome)` closes the dialog.
    pub fn handle_key(&mut self, key: DialogKey) -> Option<DialogOutcome> {
        match key {
            DialogKey::Esc => Some(DialogOutcome::Cancelled),
            DialogKey::Backspace => {
                self.input.pop();
                self.error = None;
                None
            }
            DialogKey::Char(c) => {
                match self.kind {
                    DialogKind::Bid { .. } => {
                        if c.is_ascii_digit() {
                            self.input.push(c);
                            self.error = None;
                        }
                    }
                    DialogKind::Contact => {
                        if !c.is_control() {
                            self.input.push(c);
                            self.error = None;
                        }
                    }
                }
                None
            }
            DialogKey::Enter => self.confirm(),
        }
    }

    fn confirm(&mut self) -> Option<DialogOutcome> {
        match self.kind {
            DialogKind::Bid { minimum } => match self.input.parse::<Amount>() {
                Ok(amount) if amount >= minimum => Some(DialogOutcome::BidConfirmed(amount)),
                Ok(_) => {
                    self.error = Some(format!("bid must be at least {}", minimum));
                    None
                }
                Err(_) => {
                    self.error = Some("enter a whole amount".to_string());
                    None
                }
            },
            DialogKind::Contact => {
                let peer = self.input.trim();
                if peer.is_empty() {
                    self.error = Some("user id cannot be empty".to_string());
                    None
                } else {
                    Some(DialogOutcome::ContactConfirmed(peer.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(dialog: &mut Dialog, s: &str) {
        for c in s.chars() {
            assert!(dialog.handle_key(DialogKey::Char(c)).is_none());
        }
    }

    #[test]
    fn bid_dialog_returns_typed_amount() {
        let mut dialog = Dialog::bid(1_100_000);
        type_str(&mut dialog, "1200000");
        assert_eq!(
            dialog.handle_key(DialogKey::Enter),
            Some(DialogOutcome::BidConfirmed(1_200_000))
        );
    }

    #[test]
    fn bid_dialog_blocks_amounts_below_minimum() {
        let mut dialog = Dialog::bid(1_100_000);
        type_str(&mut dialog, "1050000");
        assert_eq!(dialog.handle_key(DialogKey::Enter), None);
        assert!(dialog.error.as_deref().unwrap().contains("1100000"));
    }

    #[test]
    fn bid_dialog_ignores_non_digits() {
        let mut dialog = Dialog::bid(10);
        type_str(&mut dialog, "1a2b");
        assert_eq!(dialog.input, "12");
    }

    #[test]
    fn escape_cancels_without_a_value() {
        let mut dialog = Dialog::bid(10);
        type_str(&mut dialog, "999");
        assert_eq!(
            dialog.handle_key(DialogKey::Esc),
            Some(DialogOutcome::Cancelled)
        );
    }

    #[test]
    fn contact_dialog_trims_and_requires_input() {
        let mut dialog = Dialog::contact();
        assert_eq!(dialog.handle_key(DialogKey::Enter), None);
        assert!(dialog.error.is_some());
        type_str(&mut dialog, " u42 ");
        assert_eq!(
            dialog.handle_key(DialogKey::Enter),
            Some(DialogOutcome::ContactConfirmed("u42".to_string()))
        );
    }
}
