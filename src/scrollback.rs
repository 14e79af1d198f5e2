use std::collections::VecDeque;

/// Bounded line buffer. Oldest lines are dropped once `capacity` is reached.
#[derive(Clone, Debug)]
pub struct Scrollback {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Scrollback {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends text, splitting it on newlines. A trailing newline does not
    /// produce an extra empty line.
    pub fn push(&mut self, text: &str) {
        let text = text.strip_suffix('\n').unwrap_or(text);
        for line in text.split('\n') {
            if self.lines.len() == self.capacity {
                self.lines.pop_front();
            }
            self.lines.push_back(line.trim_end_matches('\r').to_string());
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

impl Default for Scrollback {
    fn default() -> Self {
        Self::new(5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_splits_lines() {
        let mut buf = Scrollback::new(10);
        buf.push("a\nb\r\n");
        buf.push("");
        assert_eq!(buf.to_vec(), vec!["a", "b", ""]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buf = Scrollback::new(2);
        buf.push("1");
        buf.push("2");
        buf.push("3");
        assert_eq!(buf.to_vec(), vec!["2", "3"]);
        assert_eq!(buf.last(), Some("3"));
    }
}
