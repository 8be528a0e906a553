//! `#[trivial_delegation]` marks a function whose only job is to forward to
//! another object.
//!
//! The attribute checks that the body is a single expression and marks the
//! function `#[inline]`. Anything more than a pass-through is rejected at
//! compile time, which keeps decorators honest about what they override.
//!
//! ```ignore
//! impl Session for SessionProxy {
//!     #[trivial_delegation]
//!     fn id(&self) -> &str {
//!         self.delegate.target().id()
//!     }
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, ItemFn, Stmt};

#[proc_macro_attribute]
pub fn trivial_delegation(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let attr = proc_macro2::TokenStream::from(attr);
        return syn::Error::new(attr.span(), "trivial_delegation takes no arguments")
            .to_compile_error()
            .into();
    }

    let func = parse_macro_input!(item as ItemFn);

    if let Err(err) = check_single_expression(&func) {
        return err.to_compile_error().into();
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = func;

    quote! {
        #(#attrs)*
        #[inline]
        #vis #sig #block
    }
    .into()
}

fn check_single_expression(func: &ItemFn) -> syn::Result<()> {
    match func.block.stmts.as_slice() {
        [Stmt::Expr(_, _)] => Ok(()),
        [] => Err(syn::Error::new(
            func.block.span(),
            "trivial delegation must forward to another call",
        )),
        _ => Err(syn::Error::new(
            func.block.span(),
            format!(
                "`{}` is not a trivial delegation: body must be a single expression",
                func.sig.ident
            ),
        )),
    }
}
