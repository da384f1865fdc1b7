//! # Library Domain Models
//!
//! Domain models for the book library: shelved books, shelves, curated
//! lists, loans, and the sort/staleness/redirect predicates the sync engine
//! is written against.

pub mod models;

pub use models::{
    Availability, Book, BookList, DisplayItem, Loan, LoanKind, Shelf, ShelfSort, SortOrder,
};
