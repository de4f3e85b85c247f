/// Integration tests for the engine facade and its SQLite backing store
mod engine_workflow;
