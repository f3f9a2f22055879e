//! End-to-end tests for the job runner and scheduler against fake
//! collaborators and a real file-backed ledger.

mod helpers;
mod scenarios;
mod scheduler;
