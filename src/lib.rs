//! phash_gen: perfect and minimal perfect hash generator for static key sets.
//!
//! - Keys are byte strings, 32-bit integers, or caller-chosen (a, b) pairs.
//! - Each key is hashed to (a, b); keys are bucketed by `b` and `tab[b]` is
//!   chosen so that `a ^ scramble[tab[b]]` is distinct for every key.
//! - Up to eight integers may get a closed-form formula with no table at all.
//! - The result carries the formula, which can be evaluated here or emitted
//!   as Rust source (feature `codegen`).

mod bucket;
mod builder;
mod config;
pub mod emit;
mod gencode;
pub mod hash;
mod hex;
mod hexn;
mod key;
mod loader;
mod perfect;
mod phash;
mod scramble;
mod util;

pub use builder::{Builder, Capacity, PhashError};
pub use config::{BuildConfig, Effort, HashForm, KeyKind, Minimality, Mode, SCRAMBLED_TAB_VALUES, USE_SCRAMBLE};
pub use gencode::{BitRange, Env, Expr, GenCode, Op, Stmt, Var};
pub use key::KeyData;
pub use loader::load_keys;
pub use phash::{PerfectHash, Width};
pub use scramble::permute;
