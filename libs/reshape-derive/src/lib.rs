use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Fields, LitStr, Visibility,
};

/// Derive macro making a struct convertible by the `reshape` engine.
///
/// Generates `Typed`, `Reflect` and `StructAccess` implementations. The
/// struct must implement `Clone` and `Default`; every public, non-skipped
/// field must be convertible itself.
///
/// # Attributes
///
/// Container: `#[reshape(scan)]`, `#[reshape(assign_to)]` advertise the
/// hooks (implement `ScanTarget` / `AssignSource` by hand), and
/// `#[reshape(opaque)]` hides the layout entirely.
///
/// Field: `#[reshape(rename = "...")]`, `#[reshape(skip)]` and
/// `#[reshape(validate = "...")]`. `#[serde(rename = "...")]` and
/// `#[serde(skip)]` are honored when no `reshape` attribute says otherwise.
///
/// # Example
///
/// ```ignore
/// #[derive(Reflect, Clone, Default)]
/// pub struct Account {
///     #[reshape(rename = "login", validate = "not_empty,minlength=3")]
///     pub name: String,
///     pub age: u32,
/// }
/// ```
#[proc_macro_derive(Reflect, attributes(reshape))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct ContainerAttrs {
    scan: bool,
    assign_to: bool,
    opaque: bool,
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    validate: Option<String>,
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;
    let container = container_attrs(&input.attrs)?;

    let mut generics = input.generics.clone();
    let params: Vec<_> = generics.type_params().map(|p| p.ident.clone()).collect();
    let where_clause = generics.make_where_clause();
    for param in params {
        where_clause.predicates.push(parse_quote! {
            #param: ::reshape::reflect::Typed
                + ::core::clone::Clone
                + ::core::default::Default
        });
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Some(&fields.named),
            _ if container.opaque => None,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Reflect needs named fields; use #[reshape(opaque)] for other structs",
                ));
            }
        },
        _ if container.opaque => None,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Reflect only supports structs; use #[reshape(opaque)] for other types",
            ));
        }
    };

    let mut capabilities = Vec::new();
    let mut hooks = Vec::new();
    if container.scan {
        capabilities.push(quote! { .with_scan() });
        hooks.push(quote! {
            fn as_scan_target(&mut self) -> Option<&mut dyn ::reshape::reflect::ScanTarget> {
                Some(self)
            }
        });
    }
    if container.assign_to {
        capabilities.push(quote! { .with_assign_to() });
        hooks.push(quote! {
            fn as_assign_source(&self) -> Option<&dyn ::reshape::reflect::AssignSource> {
                Some(self)
            }
        });
    }

    // Opaque: descriptor and views carry no layout.
    let Some(fields) = fields.filter(|_| !container.opaque) else {
        return Ok(quote! {
            impl #impl_generics ::reshape::reflect::Typed for #name #ty_generics #where_clause {
                fn type_info() -> &'static ::reshape::reflect::TypeInfo {
                    ::reshape::reflect::intern::<Self>(|| {
                        ::reshape::reflect::TypeInfo::new::<Self>(::reshape::reflect::Kind::Opaque)
                            #(#capabilities)*
                    })
                }
            }

            impl #impl_generics ::reshape::reflect::Reflect for #name #ty_generics #where_clause {
                ::reshape::reflect_any!();

                fn reflect_ref(&self) -> ::reshape::reflect::ReflectRef<'_> {
                    ::reshape::reflect::ReflectRef::Opaque
                }

                fn reflect_mut(&mut self) -> ::reshape::reflect::ReflectMut<'_> {
                    ::reshape::reflect::ReflectMut::Opaque
                }

                #(#hooks)*
            }
        });
    };

    let mut field_infos = Vec::new();
    let mut read_arms = Vec::new();
    let mut write_arms = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let declared = ident.unraw().to_string();
        let attrs = field_attrs(&field.attrs)?;
        let public = !matches!(field.vis, Visibility::Inherited);

        let mut info = quote! { ::reshape::reflect::FieldInfo::new(#declared) };
        if let Some(alias) = &attrs.rename {
            info.extend(quote! { .renamed(#alias) });
        }
        if let Some(annotation) = &attrs.validate {
            info.extend(quote! { .validated(#annotation) });
        }
        if attrs.skip {
            info.extend(quote! { .skipped() });
        } else if !public {
            info.extend(quote! { .private() });
        } else {
            let ty = &field.ty;
            info.extend(quote! {
                .typed(<#ty as ::reshape::reflect::Typed>::type_info as ::reshape::reflect::TypeFn)
            });
            read_arms.push(quote! { #index => Some(&self.#ident) });
            write_arms.push(quote! { #index => Some(&mut self.#ident) });
        }
        field_infos.push(info);
    }

    Ok(quote! {
        impl #impl_generics ::reshape::reflect::Typed for #name #ty_generics #where_clause {
            fn type_info() -> &'static ::reshape::reflect::TypeInfo {
                ::reshape::reflect::intern::<Self>(|| {
                    ::reshape::reflect::TypeInfo::new::<Self>(::reshape::reflect::Kind::Struct(
                        ::reshape::reflect::StructInfo::new(vec![#(#field_infos),*]),
                    ))
                    #(#capabilities)*
                })
            }
        }

        impl #impl_generics ::reshape::reflect::Reflect for #name #ty_generics #where_clause {
            ::reshape::reflect_any!();

            fn reflect_ref(&self) -> ::reshape::reflect::ReflectRef<'_> {
                ::reshape::reflect::ReflectRef::Struct(self)
            }

            fn reflect_mut(&mut self) -> ::reshape::reflect::ReflectMut<'_> {
                ::reshape::reflect::ReflectMut::Struct(self)
            }

            #(#hooks)*
        }

        impl #impl_generics ::reshape::reflect::StructAccess for #name #ty_generics #where_clause {
            fn field(&self, index: usize) -> Option<&dyn ::reshape::reflect::Reflect> {
                match index {
                    #(#read_arms,)*
                    _ => None,
                }
            }

            fn field_mut(&mut self, index: usize) -> Option<&mut dyn ::reshape::reflect::Reflect> {
                match index {
                    #(#write_arms,)*
                    _ => None,
                }
            }
        }
    })
}

fn container_attrs(attrs: &[Attribute]) -> Result<ContainerAttrs, syn::Error> {
    let mut out = ContainerAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("reshape") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("scan") {
                out.scan = true;
            } else if meta.path.is_ident("assign_to") {
                out.assign_to = true;
            } else if meta.path.is_ident("opaque") {
                out.opaque = true;
            } else {
                return Err(meta.error("expected `scan`, `assign_to` or `opaque`"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// `reshape` attributes win over `serde` ones regardless of order.
fn field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs, syn::Error> {
    let mut own = FieldAttrs::default();
    let mut serde_rename = None;
    let mut serde_skip = false;

    for attr in attrs {
        if attr.path().is_ident("reshape") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    own.rename = Some(value.value());
                } else if meta.path.is_ident("skip") {
                    own.skip = true;
                } else if meta.path.is_ident("validate") {
                    let value: LitStr = meta.value()?.parse()?;
                    own.validate = Some(value.value());
                } else {
                    return Err(meta.error("expected `rename`, `skip` or `validate`"));
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(syn::Token![=]) {
                    let value: LitStr = meta.value()?.parse()?;
                    serde_rename = Some(value.value());
                } else if meta.path.is_ident("skip") {
                    serde_skip = true;
                } else if meta.input.peek(syn::Token![=]) {
                    let _: syn::Expr = meta.value()?.parse()?;
                } else if meta.input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let _: TokenStream2 = content.parse()?;
                }
                Ok(())
            })?;
        }
    }

    if own.rename.is_none() {
        own.rename = serde_rename;
    }
    own.skip |= serde_skip;
    Ok(own)
}
