extern crate proc_macro;

mod mapped;

use proc_macro::TokenStream;

#[proc_macro_derive(Mapped, attributes(mapped))]
pub fn derive_mapped(input: TokenStream) -> TokenStream {
    crate::mapped::derive_mapped(input)
}
