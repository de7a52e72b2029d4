// Terminal Output
// Coloured status lines on stderr for the exrun commands

#[derive(Debug, Clone, Copy)]
enum Mark {
    Done,
    Failed,
    Warning,
    Note,
}

impl Mark {
    fn symbol(self) -> &'static str {
        match self {
            Mark::Done => "\u{2713}",
            Mark::Failed => "\u{2717}",
            Mark::Warning => "!",
            Mark::Note => "i",
        }
    }

    /// SGR parameters for the symbol
    fn colour(self) -> &'static str {
        match self {
            Mark::Done => "1;32",
            Mark::Failed => "1;31",
            Mark::Warning => "33",
            Mark::Note => "36",
        }
    }
}

fn marked(mark: Mark, message: &str) {
    eprintln!("\x1b[{}m  {}\x1b[0m {}", mark.colour(), mark.symbol(), message);
}

/// Right-aligned verb followed by its subject, e.g. "     Running sweep.json"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

pub fn success(message: &str) {
    marked(Mark::Done, message);
}

pub fn failure(message: &str) {
    marked(Mark::Failed, message);
}

pub fn warning(message: &str) {
    marked(Mark::Warning, message);
}

pub fn info(message: &str) {
    marked(Mark::Note, message);
}

pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}
