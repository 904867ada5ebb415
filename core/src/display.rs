//! Failure messages on attached displays

use crate::host::Display;

/// Split `message` into lines no wider than `width` columns
///
/// Tabs become two spaces. Words longer than a line are broken mid-word;
/// explicit newlines are kept.
pub fn wrap_message(message: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let text = message.replace('\t', "  ");
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut fresh = true;
        for word in paragraph.split(' ') {
            let word_len = word.chars().count();
            let needed = if fresh {
                word_len
            } else {
                line.chars().count() + 1 + word_len
            };

            if needed <= width {
                if !fresh {
                    line.push(' ');
                }
                line.push_str(word);
                fresh = false;
                continue;
            }

            if !fresh {
                lines.push(std::mem::take(&mut line));
            }
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > width {
                let rest = chars.split_off(width);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            line = chars.into_iter().collect();
            fresh = false;
        }
        lines.push(line);
    }

    lines
}

/// Clear `display` and write `message` from the top row
pub fn render(display: &dyn Display, message: &str) {
    display.clear();
    for (row, line) in wrap_message(message, display.width()).iter().enumerate() {
        display.set_line(row, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_short_message_is_one_line() {
        assert_eq!(wrap_message("kernel panic", 40), vec!["kernel panic"]);
    }

    #[test]
    fn test_wraps_on_word_boundaries() {
        assert_eq!(
            wrap_message("not enough memory left", 10),
            vec!["not enough", "memory", "left"]
        );
    }

    #[test]
    fn test_breaks_long_words_and_expands_tabs() {
        assert_eq!(wrap_message("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap_message("\tx", 10), vec!["  x"]);
        assert_eq!(wrap_message("a\nb", 10), vec!["a", "b"]);
    }

    #[derive(Default)]
    struct Screen {
        lines: Mutex<Vec<(usize, String)>>,
        clears: Mutex<usize>,
    }

    impl Display for Screen {
        fn width(&self) -> usize {
            8
        }
        fn clear(&self) {
            *self.clears.lock() += 1;
            self.lines.lock().clear();
        }
        fn set_line(&self, row: usize, text: &str) {
            self.lines.lock().push((row, text.to_string()));
        }
    }

    #[test]
    fn test_render_clears_then_writes_rows() {
        let screen = Screen::default();
        render(&screen, "protocol error");
        assert_eq!(*screen.clears.lock(), 1);
        assert_eq!(
            *screen.lines.lock(),
            vec![(0, "protocol".to_string()), (1, "error".to_string())]
        );
    }
}
