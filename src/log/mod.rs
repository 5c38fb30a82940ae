pub mod edit_journal;
