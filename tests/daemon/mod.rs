//! Daemon tests that run `serve` inside the test process
