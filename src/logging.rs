use slog::{o, Discard, Drain, Level, LevelFilter, Logger};

/// Terminal logger in the full slog-term format, drained asynchronously.
pub fn terminal(level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = LevelFilter::new(drain, level).fuse();

    Logger::root(drain, o!())
}

/// A logger that swallows every record.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
