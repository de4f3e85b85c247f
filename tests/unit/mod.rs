/// Unit tests for the public streak and recurrence rules
mod streak_lifecycle_tests;
