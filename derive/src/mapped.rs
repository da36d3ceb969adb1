use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, Meta, NestedMeta};

#[derive(Debug, Default)]
struct TypeAttribs {
    serde: bool,
}

#[derive(Debug, Default)]
struct FieldAttribs {
    skip: bool,
    read_only: bool,
    extra: bool,
}

pub fn derive_mapped(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    if !ast.generics.params.is_empty() {
        panic!("Mapped can be derived only for non-generic types");
    }
    let attribs = parse_type_attribs(&ast.attrs);
    let name = &ast.ident;
    let body = if attribs.serde {
        derive_serde(name)
    } else {
        match &ast.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(_) => derive_struct(name, &data.fields),
                _ => panic!("Mapped can be derived only for structs with named fields"),
            },
            Data::Enum(data) => {
                let variants = data
                    .variants
                    .iter()
                    .map(|variant| match variant.fields {
                        Fields::Unit => &variant.ident,
                        _ => panic!(
                            "Mapped can be derived only for enums with unit variants, use `#[mapped(serde)]` for `{}`",
                            name
                        ),
                    })
                    .collect::<Vec<_>>();
                derive_enum(name, &variants)
            }
            _ => panic!("Mapped can be derived only for structs and enums"),
        }
    };
    quote! {
        const _: () = {
            #body
        };
    }
    .into()
}

fn impl_any() -> TokenStream2 {
    quote! {
        fn type_key(&self) -> object_mapping::TypeKey {
            object_mapping::TypeKey::of::<Self>()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
    }
}

fn derive_struct(name: &Ident, fields: &Fields) -> TokenStream2 {
    let impl_any = impl_any();
    let mut members = vec![];
    let mut getters = vec![];
    let mut setters = vec![];
    let mut extra = None;
    for field in fields {
        let attribs = parse_field_attribs(&field.attrs);
        let ident = match &field.ident {
            Some(ident) => ident,
            None => continue,
        };
        if attribs.extra {
            if extra.is_some() {
                panic!("`{}` can have only one `#[mapped(extra)]` field", name);
            }
            extra = Some(ident);
            continue;
        }
        if attribs.skip {
            continue;
        }
        let key = ident.to_string();
        let ty = &field.ty;
        if attribs.read_only {
            members.push(quote! {
                object_mapping::MemberInfo::read_only(#key, <#ty as object_mapping::Mapped>::type_spec)
            });
            setters.push(quote! {
                #key => Err(object_mapping::Error::ReadOnlyMember {
                    owner: std::any::type_name::<Self>(),
                    member: name.to_owned(),
                }),
            });
        } else {
            members.push(quote! {
                object_mapping::MemberInfo::new(#key, <#ty as object_mapping::Mapped>::type_spec)
            });
            setters.push(quote! {
                #key => {
                    self.#ident = <#ty as object_mapping::Mapped>::from_reflect(value)?;
                    Ok(())
                }
            });
        }
        getters.push(quote! {
            #key => Some(&self.#ident as &dyn object_mapping::Reflect),
        });
    }
    let extra = match extra {
        Some(ident) => quote! {
            fn extra(&self) -> Option<&object_mapping::Value> {
                Some(&self.#ident)
            }

            fn extra_mut(&mut self) -> Option<&mut object_mapping::Value> {
                Some(&mut self.#ident)
            }
        },
        None => Default::default(),
    };
    quote! {
        const MEMBERS: &[object_mapping::MemberInfo] = &[ #( #members , )* ];

        impl object_mapping::Reflect for #name {
            #impl_any

            fn reflect_ref(&self) -> object_mapping::ReflectRef<'_> {
                object_mapping::ReflectRef::Struct(self)
            }

            fn reflect_mut(&mut self) -> object_mapping::ReflectMut<'_> {
                object_mapping::ReflectMut::Struct(self)
            }
        }

        impl object_mapping::Struct for #name {
            fn members(&self) -> &'static [object_mapping::MemberInfo] {
                MEMBERS
            }

            fn member(&self, name: &str) -> Option<&dyn object_mapping::Reflect> {
                match name {
                    #( #getters )*
                    _ => None,
                }
            }

            #[allow(unreachable_code, unused_variables)]
            fn set_member(
                &mut self,
                name: &str,
                value: Box<dyn object_mapping::Reflect>,
            ) -> object_mapping::Result<()> {
                match name {
                    #( #setters )*
                    _ => Err(object_mapping::Error::UnknownMember {
                        owner: std::any::type_name::<Self>(),
                        member: name.to_owned(),
                    }),
                }
            }

            #extra
        }

        impl object_mapping::Mapped for #name {
            fn type_spec() -> object_mapping::TypeSpec {
                object_mapping::TypeSpec::object::<Self>(MEMBERS, || {
                    Box::new(<Self as Default>::default()) as Box<dyn object_mapping::Reflect>
                })
            }
        }
    }
}

fn derive_enum(name: &Ident, variants: &[&Ident]) -> TokenStream2 {
    if variants.is_empty() {
        panic!("Mapped cannot be derived for enum `{}` without variants", name);
    }
    let impl_any = impl_any();
    let names = variants.iter().map(|variant| {
        let key = variant.to_string();
        quote! { #name::#variant => #key, }
    });
    let by_name = variants.iter().map(|variant| {
        let key = variant.to_string();
        quote! { #key => Some(#name::#variant), }
    });
    let by_index = variants.iter().enumerate().map(|(index, variant)| {
        let index = index as u64;
        quote! { Some(#index) => Some(#name::#variant), }
    });
    quote! {
        fn variant_name(value: &#name) -> &'static str {
            match value {
                #( #names )*
            }
        }

        impl object_mapping::Reflect for #name {
            #impl_any

            fn reflect_ref(&self) -> object_mapping::ReflectRef<'_> {
                object_mapping::ReflectRef::Primitive(variant_name(self).into())
            }
        }

        fn from_value(
            value: &object_mapping::Value,
        ) -> object_mapping::Result<Box<dyn object_mapping::Reflect>> {
            let result = match value {
                object_mapping::Value::String(text) => match text.as_str() {
                    #( #by_name )*
                    _ => None,
                },
                object_mapping::Value::Number(number) => match number.to_u64() {
                    #( #by_index )*
                    _ => None,
                },
                _ => None,
            };
            match result {
                Some(result) => Ok(Box::new(result)),
                None => Err(object_mapping::Error::InvalidValue {
                    expected: std::any::type_name::<#name>(),
                    found: value.clone(),
                }),
            }
        }

        impl object_mapping::Mapped for #name {
            fn type_spec() -> object_mapping::TypeSpec {
                object_mapping::TypeSpec::leaf::<Self>(from_value)
            }
        }
    }
}

fn derive_serde(name: &Ident) -> TokenStream2 {
    let impl_any = impl_any();
    quote! {
        impl object_mapping::Reflect for #name {
            #impl_any

            fn reflect_ref(&self) -> object_mapping::ReflectRef<'_> {
                object_mapping::ReflectRef::Opaque
            }

            fn to_representation(&self) -> Option<object_mapping::Result<object_mapping::Value>> {
                Some(object_mapping::to_value(self))
            }
        }

        fn from_value(
            value: &object_mapping::Value,
        ) -> object_mapping::Result<Box<dyn object_mapping::Reflect>> {
            Ok(Box::new(object_mapping::from_value::<#name>(value)?))
        }

        impl object_mapping::Mapped for #name {
            fn type_spec() -> object_mapping::TypeSpec {
                object_mapping::TypeSpec::leaf::<Self>(from_value)
            }
        }
    }
}

fn parse_type_attribs(attrs: &[Attribute]) -> TypeAttribs {
    let mut result = TypeAttribs::default();
    for attrib in attrs.iter().filter(|attrib| attrib.path.is_ident("mapped")) {
        match attrib.parse_meta() {
            Err(error) => panic!(
                "Could not parse attribute `{}`: {:?}",
                attrib.to_token_stream(),
                error
            ),
            Ok(Meta::List(meta)) => {
                for meta in meta.nested {
                    if let NestedMeta::Meta(Meta::Path(path)) = &meta {
                        if path.is_ident("serde") {
                            result.serde = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    result
}

fn parse_field_attribs(attrs: &[Attribute]) -> FieldAttribs {
    let mut result = FieldAttribs::default();
    for attrib in attrs.iter().filter(|attrib| attrib.path.is_ident("mapped")) {
        match attrib.parse_meta() {
            Err(error) => panic!(
                "Could not parse attribute `{}`: {:?}",
                attrib.to_token_stream(),
                error
            ),
            Ok(Meta::List(meta)) => {
                for meta in meta.nested {
                    if let NestedMeta::Meta(Meta::Path(path)) = &meta {
                        if path.is_ident("skip") {
                            result.skip = true;
                        } else if path.is_ident("read_only") {
                            result.read_only = true;
                        } else if path.is_ident("extra") {
                            result.extra = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    result
}
