use proc_macro::TokenStream;
use quote::quote;

use syn::spanned::Spanned as _;
use syn::{
    Data, DeriveInput, Error, FnArg, GenericArgument, ImplItem, ImplItemFn, ItemImpl, Pat,
    PathArguments, Type,
};

const CONSTRUCTOR_ATTR: &str = "constructor";

fn extract_arc_type(ty: &Type) -> Option<Type> {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Arc"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return Some(inner.clone());
    }
    None
}

/// Returns the parameter kind and the statement pulling the argument out of
/// the `__args` cursor.
///
/// `Arc<T>` injects kind `T` as a shared handle. Any other type, including
/// `Arc<dyn Trait>`, injects its own kind by value.
fn injection(
    ident: &syn::Ident,
    ty: &Type,
) -> Result<(proc_macro2::TokenStream, proc_macro2::TokenStream), Error> {
    if let Type::Reference(_) = ty {
        return Err(Error::new(
            ty.span(),
            "Reference parameters are not supported, use Arc<T> or an owned type",
        ));
    }
    match extract_arc_type(ty) {
        Some(inner) if !matches!(inner, Type::TraitObject(_)) => Ok((
            quote! { ::contractor::Kind::of::<#inner>() },
            quote! { let #ident = __args.next_arc::<#inner>()?; },
        )),
        _ => Ok((
            quote! { ::contractor::Kind::of::<#ty>() },
            quote! { let #ident = __args.next::<#ty>()?; },
        )),
    }
}

/// Derive macro generating a one-constructor table from the struct fields.
#[proc_macro_derive(Injectable)]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    handle_derive_injectable(input)
}

/// Attribute macro for impl blocks whose `#[constructor]` functions form the
/// constructor table.
#[proc_macro_attribute]
pub fn injectable(_attr: TokenStream, item: TokenStream) -> TokenStream {
    if let Ok(item_impl) = syn::parse::<ItemImpl>(item) {
        return handle_injectable_impl(item_impl);
    }
    TokenStream::from(
        Error::new(
            proc_macro2::Span::call_site(),
            "#[injectable] can only be applied to impl blocks",
        )
        .to_compile_error(),
    )
}

fn handle_derive_injectable(input: DeriveInput) -> TokenStream {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return TokenStream::from(
            Error::new(input.generics.span(), "Generic structs are not supported")
                .to_compile_error(),
        );
    }
    let fields = match &input.data {
        Data::Struct(s) => &s.fields,
        _ => {
            return TokenStream::from(
                Error::new(name.span(), "Only structs are supported").to_compile_error(),
            );
        }
    };

    let mut parameters = Vec::new();
    let mut field_lets = Vec::new();
    let mut field_inits = Vec::new();

    match fields {
        syn::Fields::Named(fields) => {
            for field in &fields.named {
                let field_ident = field.ident.as_ref().unwrap();
                match injection(field_ident, &field.ty) {
                    Ok((kind, stmt)) => {
                        parameters.push(kind);
                        field_lets.push(stmt);
                        field_inits.push(quote! { #field_ident });
                    }
                    Err(e) => return TokenStream::from(e.to_compile_error()),
                }
            }
        }
        syn::Fields::Unnamed(_) => {
            return TokenStream::from(
                Error::new(name.span(), "Tuple structs are not supported").to_compile_error(),
            );
        }
        syn::Fields::Unit => {}
    }

    let body = if matches!(fields, syn::Fields::Unit) {
        quote! { Self }
    } else {
        quote! { Self { #(#field_inits,)* } }
    };
    let constructor_name = format!("{name}");

    quote! {
        impl ::contractor::Constructible for #name {
            fn constructors() -> ::std::vec::Vec<::contractor::Constructor<Self>> {
                ::std::vec![
                    ::contractor::Constructor::new(
                        ::std::vec![#(#parameters),*],
                        |__args: &mut ::contractor::Arguments| -> ::std::result::Result<Self, ::contractor::StdError> {
                            #(#field_lets)*
                            ::std::result::Result::Ok(#body)
                        },
                    )
                    .named(#constructor_name),
                ]
            }
        }
    }
    .into()
}

fn handle_injectable_impl(input: ItemImpl) -> TokenStream {
    if input.trait_.is_some() {
        return TokenStream::from(
            Error::new(input.span(), "Trait impls are not supported").to_compile_error(),
        );
    }
    if !input.generics.params.is_empty() {
        return TokenStream::from(
            Error::new(input.generics.span(), "Generic impls are not supported")
                .to_compile_error(),
        );
    }

    let self_ty = &input.self_ty;
    let type_name = quote!(#self_ty).to_string().replace(' ', "");
    let mut constructors = Vec::new();

    for item in &input.items {
        if let ImplItem::Fn(method) = item
            && method
                .attrs
                .iter()
                .any(|attr| attr.path().is_ident(CONSTRUCTOR_ATTR))
        {
            match constructor_entry(method, self_ty, &type_name) {
                Ok(entry) => constructors.push(entry),
                Err(e) => return TokenStream::from(e.to_compile_error()),
            }
        }
    }

    if constructors.is_empty() {
        return TokenStream::from(
            Error::new(input.span(), "No #[constructor] method found").to_compile_error(),
        );
    }

    // Remove the marker attributes before re-emitting the impl block.
    let mut cleaned_input = input.clone();
    for item in &mut cleaned_input.items {
        if let ImplItem::Fn(method) = item {
            method
                .attrs
                .retain(|attr| !attr.path().is_ident(CONSTRUCTOR_ATTR));
        }
    }

    quote! {
        #cleaned_input

        impl ::contractor::Constructible for #self_ty {
            fn constructors() -> ::std::vec::Vec<::contractor::Constructor<Self>> {
                ::std::vec![#(#constructors),*]
            }
        }
    }
    .into()
}

fn constructor_entry(
    method: &ImplItemFn,
    self_ty: &Type,
    type_name: &str,
) -> Result<proc_macro2::TokenStream, Error> {
    if method.sig.asyncness.is_some() {
        return Err(Error::new(
            method.sig.span(),
            "Constructor methods cannot be async",
        ));
    }
    if !method.sig.generics.params.is_empty() {
        return Err(Error::new(
            method.sig.generics.span(),
            "Constructor methods cannot be generic",
        ));
    }

    let method_name = &method.sig.ident;
    let is_result = match &method.sig.output {
        syn::ReturnType::Default => {
            return Err(Error::new(
                method.sig.span(),
                "Constructor method must return Self or Result<Self, E>",
            ));
        }
        syn::ReturnType::Type(_, ty) => returns_result(ty, self_ty)?,
    };

    let mut parameters = Vec::new();
    let mut arg_lets = Vec::new();
    let mut arg_names = Vec::new();

    for fn_arg in &method.sig.inputs {
        match fn_arg {
            FnArg::Receiver(_) => {
                return Err(Error::new(
                    fn_arg.span(),
                    "Constructor method cannot have self parameter",
                ));
            }
            FnArg::Typed(pat_type) => {
                let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
                    return Err(Error::new(
                        pat_type.pat.span(),
                        "Only simple bindings supported",
                    ));
                };
                let arg_name = &pat_ident.ident;
                let (kind, stmt) = injection(arg_name, &pat_type.ty)?;
                parameters.push(kind);
                arg_lets.push(stmt);
                arg_names.push(quote! { #arg_name });
            }
        }
    }

    let method_call = quote! { Self::#method_name(#(#arg_names),*) };
    let body = if is_result {
        quote! { #method_call.map_err(::std::convert::Into::into) }
    } else {
        quote! { ::std::result::Result::Ok(#method_call) }
    };
    let constructor_name = format!("{type_name}::{method_name}");

    Ok(quote! {
        ::contractor::Constructor::new(
            ::std::vec![#(#parameters),*],
            |__args: &mut ::contractor::Arguments| -> ::std::result::Result<Self, ::contractor::StdError> {
                #(#arg_lets)*
                #body
            },
        )
        .named(#constructor_name)
    })
}

/// Checks that the return type is `Self`, the impl type, or a `Result` of
/// either, and reports whether it is a `Result`.
fn returns_result(ty: &Type, self_ty: &Type) -> Result<bool, Error> {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Result"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return is_self(inner, self_ty).then_some(true).ok_or_else(|| {
            Error::new(inner.span(), "Constructor method must build Self")
        });
    }
    is_self(ty, self_ty)
        .then_some(false)
        .ok_or_else(|| Error::new(ty.span(), "Constructor method must return Self or Result<Self, E>"))
}

fn is_self(ty: &Type, self_ty: &Type) -> bool {
    if let Type::Path(type_path) = ty
        && type_path.path.is_ident("Self")
    {
        return true;
    }
    quote!(#ty).to_string() == quote!(#self_ty).to_string()
}
