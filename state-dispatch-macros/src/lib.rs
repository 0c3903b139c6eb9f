//! Procedural macros for state-dispatch

use std::collections::HashMap;

use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(ActionType)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(action), supports(enum_unit))]
struct ActionTypeOpts {
    ident: syn::Ident,
    data: darling::ast::Data<ActionTypeVariant, ()>,

    /// Prefix every type string with `<namespace>/`
    #[darling(default)]
    namespace: Option<String>,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(action))]
struct ActionTypeVariant {
    ident: syn::Ident,

    /// Explicit type name instead of the SCREAMING_SNAKE form of the variant
    #[darling(default)]
    rename: Option<String>,
}

/// Split a PascalCase string into parts.
///
/// Runs of capitals stay together as one part, so `HTTPRequest` splits into
/// `HTTP` and `Request`.
fn split_pascal_case(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if !prev.is_uppercase() || next_is_lower {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Convert PascalCase to SCREAMING_SNAKE_CASE
fn to_screaming_snake_case(s: &str) -> String {
    split_pascal_case(s)
        .iter()
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Full type string for a variant
fn type_string(namespace: Option<&str>, variant: &ActionTypeVariant) -> String {
    let name = variant
        .rename
        .clone()
        .unwrap_or_else(|| to_screaming_snake_case(&variant.ident.to_string()));
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name,
    }
}

/// Derive action type constants for a fieldless enum
///
/// Each variant maps to a fixed type string: the variant name in
/// SCREAMING_SNAKE_CASE, optionally prefixed by a namespace. Generates:
/// - `as_str() -> &'static str` - the type string
/// - `ALL` - every variant in declaration order
/// - `from_type(&str) -> Option<Self>` - reverse lookup
/// - `action()` / `with_payload(..)` - build a `state_dispatch::Action`
/// - `AsRef<str>`, `Display`, and `From<Self>` for `ActionType` and `Action`
///
/// # Example
/// ```ignore
/// #[derive(ActionType, Clone, Copy, Debug, PartialEq, Eq)]
/// #[action(namespace = "todos")]
/// enum TodoAction {
///     AddTodo,
///     ToggleTodo,
///     #[action(rename = "WIPE")]
///     ClearAll,
/// }
///
/// assert_eq!(TodoAction::AddTodo.as_str(), "todos/ADD_TODO");
/// assert_eq!(TodoAction::from_type("todos/WIPE"), Some(TodoAction::ClearAll));
/// let action = TodoAction::AddTodo.with_payload("write docs");
/// ```
#[proc_macro_derive(ActionType, attributes(action))]
pub fn derive_action_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match ActionTypeOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;

    let variants = match &opts.data {
        darling::ast::Data::Enum(variants) => variants,
        _ => {
            return syn::Error::new_spanned(&input, "ActionType can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    if variants.is_empty() {
        return syn::Error::new_spanned(&input, "ActionType needs at least one variant")
            .to_compile_error()
            .into();
    }

    let namespace = opts.namespace.as_deref();
    if namespace.is_some_and(|ns| ns.contains('/')) {
        return syn::Error::new_spanned(&input, "action namespace must not contain '/'")
            .to_compile_error()
            .into();
    }

    let mut seen: HashMap<String, &syn::Ident> = HashMap::new();
    let mut entries = Vec::with_capacity(variants.len());
    for v in variants.iter() {
        if v.rename.as_deref() == Some("") {
            return syn::Error::new_spanned(&v.ident, "action rename must not be empty")
                .to_compile_error()
                .into();
        }
        let type_str = type_string(namespace, v);
        if let Some(first) = seen.insert(type_str.clone(), &v.ident) {
            let msg = format!("action type \"{type_str}\" is already used by `{first}`");
            return syn::Error::new_spanned(&v.ident, msg)
                .to_compile_error()
                .into();
        }
        entries.push((&v.ident, type_str));
    }

    let as_str_arms = entries.iter().map(|(ident, type_str)| {
        quote! { #name::#ident => #type_str }
    });
    let from_type_arms = entries.iter().map(|(ident, type_str)| {
        quote! { #type_str => ::core::option::Option::Some(#name::#ident) }
    });
    let all_variants = entries.iter().map(|(ident, _)| quote! { #name::#ident });

    let expanded = quote! {
        impl #name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [#name] = &[#(#all_variants),*];

            /// The action type string for this variant.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    #(#as_str_arms),*
                }
            }

            /// Look up the variant for an action type string.
            pub fn from_type(kind: &str) -> ::core::option::Option<Self> {
                match kind {
                    #(#from_type_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            /// The action type for this variant.
            pub fn action_type(&self) -> state_dispatch::ActionType {
                state_dispatch::ActionType::from_static(self.as_str())
            }

            /// An action of this type without payload.
            pub fn action(&self) -> state_dispatch::Action {
                state_dispatch::Action::of(self.action_type())
            }

            /// An action of this type carrying `payload`.
            pub fn with_payload(
                &self,
                payload: impl ::core::convert::Into<state_dispatch::serde_json::Value>,
            ) -> state_dispatch::Action {
                self.action().with_payload(payload)
            }

            /// Whether `action` has this variant's type.
            pub fn matches(&self, action: &state_dispatch::Action) -> bool {
                action.kind().as_str() == self.as_str()
            }
        }

        impl ::core::convert::AsRef<str> for #name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl ::core::fmt::Display for #name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::convert::From<#name> for state_dispatch::ActionType {
            fn from(value: #name) -> Self {
                value.action_type()
            }
        }

        impl ::core::convert::From<#name> for state_dispatch::Action {
            fn from(value: #name) -> Self {
                value.action()
            }
        }
    };

    TokenStream::from(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pascal_case() {
        assert_eq!(split_pascal_case("AddTodo"), vec!["Add", "Todo"]);
        assert_eq!(split_pascal_case("Tick"), vec!["Tick"]);
        assert_eq!(split_pascal_case("HTTPRequest"), vec!["HTTP", "Request"]);
        assert_eq!(split_pascal_case("LoadV2Data"), vec!["Load", "V2", "Data"]);
    }

    #[test]
    fn test_to_screaming_snake_case() {
        assert_eq!(to_screaming_snake_case("FetchUser"), "FETCH_USER");
        assert_eq!(to_screaming_snake_case("Increment"), "INCREMENT");
        assert_eq!(to_screaming_snake_case("ParseJSON"), "PARSE_JSON");
    }

    #[test]
    fn test_type_string() {
        let variant = ActionTypeVariant {
            ident: syn::parse_str("AddTodo").unwrap(),
            rename: None,
        };
        assert_eq!(type_string(None, &variant), "ADD_TODO");
        assert_eq!(type_string(Some("todos"), &variant), "todos/ADD_TODO");
        assert_eq!(type_string(Some(""), &variant), "ADD_TODO");

        let renamed = ActionTypeVariant {
            ident: syn::parse_str("ClearAll").unwrap(),
            rename: Some("WIPE".into()),
        };
        assert_eq!(type_string(Some("todos"), &renamed), "todos/WIPE");
    }
}
