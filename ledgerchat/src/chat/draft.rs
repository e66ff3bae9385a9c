//! Input-field text with a send guard.

/// The text a user is composing, plus whether a send is in flight.
///
/// A draft in flight cannot be sent again. Failed sends keep the text so
/// the user can retry; successful sends clear it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Draft {
    text: String,
    in_flight: bool,
}

impl Draft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Marks the draft in flight and returns its text.
    ///
    /// Returns `None` if a send is already in flight or the text is blank.
    pub fn begin_send(&mut self) -> Option<String> {
        if self.in_flight || self.text.trim().is_empty() {
            return None;
        }
        self.in_flight = true;
        Some(self.text.clone())
    }

    /// The send succeeded: clear the text.
    pub fn complete(&mut self) {
        self.text.clear();
        self.in_flight = false;
    }

    /// The send failed: keep the text for a retry.
    pub const fn abort(&mut self) {
        self.in_flight = false;
    }
}
