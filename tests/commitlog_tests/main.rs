//! Commit log, index, recovery and journal tests

mod journal_tests;
