//! Attribute macros that let playlist-core crates write `async fn` tests and
//! entry points without naming the underlying runtime.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs an `async fn` test on the `core_async` runtime.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, Entry::Test)
}

/// Runs an `async fn main` on the `core_async` runtime.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, Entry::Main)
}

#[derive(Clone, Copy)]
enum Entry {
    Test,
    Main,
}

fn expand(attr: TokenStream, item: TokenStream, entry: Entry) -> TokenStream {
    if !attr.is_empty() {
        let tokens = TokenStream2::from(attr);
        return syn::Error::new_spanned(tokens, "core_async entry macros take no arguments")
            .to_compile_error()
            .into();
    }

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(input.sig.fn_token, "expected an `async fn`")
            .to_compile_error()
            .into();
    }

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = input;
    sig.asyncness = None;

    let marker = match entry {
        Entry::Test => quote!(#[test]),
        Entry::Main => TokenStream2::new(),
    };

    quote! {
        #(#attrs)*
        #marker
        #vis #sig {
            core_async::runtime::block_on(async move #block)
        }
    }
    .into()
}
