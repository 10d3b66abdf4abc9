//! Ordered listing event stream (spec.md 4.8).
//!
//! The engine never formats a listing file itself — it only accumulates
//! these structured records for an external writer to render. The buffer
//! is reset whenever dead-code elimination triggers a pass restart.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEvent {
    pub file: String,
    pub file_line: u32,
    pub stream_name: String,
    pub stream_line: u32,
    pub text: String,
    pub in_macro: bool,
    pub pc: Option<u16>,
    pub bytes: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct ListingStream {
    events: Vec<ListingEvent>,
}

impl ListingStream {
    pub fn new() -> Self {
        ListingStream { events: Vec::new() }
    }

    pub fn push(&mut self, event: ListingEvent) {
        self.events.push(event);
    }

    /// Reset on a DCE restart so the replayed pass 3 produces a clean
    /// listing rather than appending to the discarded attempt's events.
    pub fn reset(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[ListingEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ListingEvent> {
        self.events
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reset_clears_buffer() {
        let mut stream = ListingStream::new();
        stream.push(ListingEvent {
            file: "a.asm".into(),
            file_line: 1,
            stream_name: "a.asm".into(),
            stream_line: 1,
            text: "NOP".into(),
            in_macro: false,
            pc: Some(0),
            bytes: Some(vec![0xC4]),
        });
        assert_eq!(stream.events().len(), 1);
        stream.reset();
        assert!(stream.events().is_empty());
    }
}
