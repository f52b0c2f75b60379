mod methods;
mod util;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;

use methods::methods_impl;

/// Applied to an `impl` block. Every method in it marked `#[coordinator]` or `#[worker]` runs only in
/// that context; calling it from the other one sends the call across the instance's channel.
#[proc_macro_attribute]
pub fn methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    let result = methods_impl(TokenStream2::from(attr), TokenStream2::from(item));
    match result {
        Ok(ts) => TokenStream::from(ts),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}
