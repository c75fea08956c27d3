#![cfg(feature = "codegen")]

//! Rust source for a finished hash.
//!
//! Meant for `build.rs`: generate once, write the tokens to a file under
//! `OUT_DIR`, then `include!` it.
//!
//! ```rust
//! let ph = phash_gen::Builder::new().build(["if", "else", "while"]).unwrap();
//! let code = phash_gen::emit::generate(&ph).to_string();
//! assert!(code.contains("fn hash"));
//! ```

use crate::config::KeyKind;
use crate::gencode::{Expr, Op, Stmt};
use crate::phash::{PerfectHash, Width};
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

/// Turn a [`PerfectHash`] into constants, tables, and a `hash` function.
pub fn generate(ph: &PerfectHash) -> TokenStream {
    CodeGenerator::new().generate(ph)
}

/// Code generator.
pub struct CodeGenerator {
    crate_path: TokenStream,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    /// Hash primitives are called through `::phash_gen::hash`.
    #[inline]
    pub fn new() -> Self {
        Self { crate_path: quote!(::phash_gen) }
    }

    /// Path this crate is reachable at from the generated code.
    #[inline]
    pub fn with_crate(mut self, path: TokenStream) -> Self {
        self.crate_path = path;
        self
    }

    pub fn generate(&self, ph: &PerfectHash) -> TokenStream {
        let salt = Literal::u32_suffixed(ph.salt_constant());
        let count = Literal::u32_suffixed(ph.nkeys);
        let range = Literal::u32_suffixed(ph.range());

        let tab = (!ph.tab.is_empty()).then(|| table(quote!(TAB), ph.tab_width(), &ph.tab));
        let scramble = ph
            .scramble
            .as_ref()
            .zip(ph.scramble_width())
            .map(|(values, width)| table(quote!(SCRAMBLE), width, values));

        let stmts = ph.code.stmts.iter().map(|s| self.stmt(s));
        let args = match ph.form.kind() {
            KeyKind::Bytes => quote!(key: &[u8]),
            KeyKind::Int => quote!(val: u32),
            KeyKind::Pair => quote!((a, b): (u32, u32)),
        };

        quote! {
            pub const SALT: u32 = #salt;
            pub const COUNT: u32 = #count;
            pub const RANGE: u32 = #range;
            #tab
            #scramble

            #[allow(unused_variables, unused_parens, clippy::let_and_return)]
            pub fn hash(#args) -> u32 {
                #(#stmts)*
                rsl
            }
        }
    }

    fn stmt(&self, stmt: &Stmt) -> TokenStream {
        match stmt {
            Stmt::Let(var, e) => {
                let name = format_ident!("{}", var.name());
                let e = self.expr(e);
                quote!(let #name = #e;)
            }
            Stmt::Checksum(level) => {
                let krate = &self.crate_path;
                let level = Literal::u32_suffixed(*level);
                quote!(let state = #krate::hash::checksum_from(key, #level);)
            }
        }
    }

    fn expr(&self, e: &Expr) -> TokenStream {
        let krate = &self.crate_path;
        match e {
            Expr::Var(v) => {
                let name = format_ident!("{}", v.name());
                quote!(#name)
            }
            Expr::Const(c) => {
                let c = Literal::u32_suffixed(*c);
                quote!(#c)
            }
            Expr::Shr(e, n) => {
                let (e, n) = (self.expr(e), Literal::u32_unsuffixed(*n));
                quote!((#e >> #n))
            }
            Expr::Shl(e, n) => {
                let (e, n) = (self.expr(e), Literal::u32_unsuffixed(*n));
                quote!((#e << #n))
            }
            Expr::Bin(op, l, r) => {
                let (l, r) = (self.expr(l), self.expr(r));
                match op {
                    Op::And => quote!((#l & #r)),
                    Op::Xor => quote!((#l ^ #r)),
                    Op::Add => quote!(#l.wrapping_add(#r)),
                    Op::Sub => quote!(#l.wrapping_sub(#r)),
                }
            }
            Expr::Neg(e) => {
                let e = self.expr(e);
                quote!(#e.wrapping_neg())
            }
            Expr::Tab(e) => {
                let e = self.expr(e);
                quote!(u32::from(TAB[#e as usize]))
            }
            Expr::Scramble(e) => {
                let e = self.expr(e);
                quote!(u32::from(SCRAMBLE[#e as usize]))
            }
            Expr::Lookup(level) => {
                let level = Literal::u32_suffixed(*level);
                quote!(#krate::hash::lookup(key, #level))
            }
            Expr::Inline(level) => {
                let level = Literal::u32_suffixed(*level);
                quote!(#krate::hash::inline_hash(key, #level))
            }
            Expr::State(w) => {
                let w = Literal::usize_unsuffixed(*w);
                quote!(state[#w])
            }
        }
    }
}

fn table(name: TokenStream, width: Width, values: &[u32]) -> TokenStream {
    let len = Literal::usize_unsuffixed(values.len());
    let values = values.iter().map(|&v| Literal::u32_unsuffixed(v));
    let ty = match width {
        Width::U8 => quote!(u8),
        Width::U16 => quote!(u16),
        Width::U32 => quote!(u32),
    };
    quote!(pub static #name: [#ty; #len] = [#(#values),*];)
}
