//! Grammar productions, split by syntactic category.

mod expr;
mod item;
mod stmt;
mod ty;
