//! # Graphcodec Derive Macros
//!
//! This crate provides the procedural macros for `graphcodec`. It generates the compile-time
//! `Shape` of a struct: one write/read accessor pair per declared field, the projection onto
//! an embedded base, and the construction and callback hooks the marshal compiler consumes.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, Index, LitInt, LitStr, parse_macro_input};

/// Derives `graphcodec::Reflect` for a persistent struct.
///
/// Container attributes (`#[persist(...)]`):
/// * `name = "..."`: qualified name written to headers (default: module path and ident).
/// * `id = N`: compact id used in headers instead of the name.
/// * `value`: encode inline by value instead of by identity. Also implements `Field`.
/// * `state`: self-describing; the type implements `StateObject`.
/// * `no_default`: the type has no parameterless constructor.
/// * `callback`: the type implements `DeserializationCallback`.
/// * `on_serializing = "method"`, `on_serialized = "method"`: a `fn(&self) -> Result<()>`
///   method called before / after this object's fields are written.
/// * `on_deserializing = "method"`, `on_deserialized = "method"`: a
///   `fn(&mut self) -> Result<()>` method called before / after this object's fields are read.
///
/// Field attributes: `transient` (not persisted), `base` (the embedded base type, whose fields
/// are persisted after this type's own).
#[proc_macro_derive(Persistent, attributes(persist))]
pub fn derive_persistent(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, true)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `graphcodec::Reflect` for a type that is described but must not be persisted.
///
/// Using such a type in a graph, or as the base of a persistent type, fails with
/// `NotSerializable`.
#[proc_macro_derive(Reflect, attributes(persist))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, false)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// --- Internal Data Structures ---

#[derive(Default)]
struct ContainerAttrs {
    name: Option<LitStr>,
    id: Option<u32>,
    value: bool,
    state: bool,
    no_default: bool,
    callback: bool,
    on_serializing: Option<Ident>,
    on_serialized: Option<Ident>,
    on_deserializing: Option<Ident>,
    on_deserialized: Option<Ident>,
}

impl ContainerAttrs {
    fn has_events(&self) -> bool {
        self.on_serializing.is_some()
            || self.on_serialized.is_some()
            || self.on_deserializing.is_some()
            || self.on_deserialized.is_some()
    }
}

#[derive(Default)]
struct FieldAttrs {
    transient: bool,
    base: bool,
}

struct FieldInfo {
    member: proc_macro2::TokenStream,
    label: String,
    ty: syn::Type,
    attrs: FieldAttrs,
}

fn parse_container_attrs(attrs: &[Attribute]) -> syn::Result<ContainerAttrs> {
    let mut parsed = ContainerAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("persist") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                parsed.name = Some(meta.value()?.parse()?);
                return Ok(());
            }
            if meta.path.is_ident("id") {
                let lit: LitInt = meta.value()?.parse()?;
                parsed.id = Some(lit.base10_parse()?);
                return Ok(());
            }
            if meta.path.is_ident("value") {
                parsed.value = true;
                return Ok(());
            }
            if meta.path.is_ident("state") {
                parsed.state = true;
                return Ok(());
            }
            if meta.path.is_ident("no_default") {
                parsed.no_default = true;
                return Ok(());
            }
            if meta.path.is_ident("callback") {
                parsed.callback = true;
                return Ok(());
            }
            let event = if meta.path.is_ident("on_serializing") {
                &mut parsed.on_serializing
            } else if meta.path.is_ident("on_serialized") {
                &mut parsed.on_serialized
            } else if meta.path.is_ident("on_deserializing") {
                &mut parsed.on_deserializing
            } else if meta.path.is_ident("on_deserialized") {
                &mut parsed.on_deserialized
            } else {
                return Err(meta.error(
                    "Unknown persist attribute key. Supported: name, id, value, state, no_default, \
                     callback, on_serializing, on_serialized, on_deserializing, on_deserialized",
                ));
            };
            let method: LitStr = meta.value()?.parse()?;
            *event = Some(method.parse()?);
            Ok(())
        })?;
    }
    if parsed.state && parsed.has_events() {
        return Err(syn::Error::new(
            Span::call_site(),
            "self-describing types export their own state and cannot declare field events",
        ));
    }
    if parsed.value && parsed.callback {
        return Err(syn::Error::new(
            Span::call_site(),
            "value types are decoded inline and cannot have a deserialization callback",
        ));
    }
    Ok(parsed)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("persist") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("transient") {
                parsed.transient = true;
                return Ok(());
            }
            if meta.path.is_ident("base") {
                parsed.base = true;
                return Ok(());
            }
            Err(meta.error("Unknown persist field attribute. Supported: transient, base"))
        })?;
    }
    if parsed.transient && parsed.base {
        return Err(syn::Error::new(
            Span::call_site(),
            "a base field cannot be transient",
        ));
    }
    Ok(parsed)
}

fn collect_fields(fields: &Fields) -> syn::Result<Vec<FieldInfo>> {
    let mut infos = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let (member, label) = match &field.ident {
            Some(ident) => (quote! { #ident }, ident.to_string()),
            None => {
                let index = Index::from(index);
                (quote! { #index }, index.index.to_string())
            }
        };
        infos.push(FieldInfo {
            member,
            label,
            ty: field.ty.clone(),
            attrs: parse_field_attrs(&field.attrs)?,
        });
    }
    Ok(infos)
}

fn expand(input: DeriveInput, persistent: bool) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "graphcodec derives do not support generic types",
        ));
    }
    let data_struct = match &input.data {
        Data::Struct(ds) => ds,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "graphcodec derives only support structs",
            ));
        }
    };

    let attrs = parse_container_attrs(&input.attrs)?;
    let fields = collect_fields(&data_struct.fields)?;

    let type_name = match &attrs.name {
        Some(lit) => quote! { #lit },
        None => quote! { concat!(module_path!(), "::", stringify!(#name)) },
    };
    let compact_id = match attrs.id {
        Some(id) => quote! { Some(#id) },
        None => quote! { None },
    };

    let shape_body = if persistent {
        generate_shape(name, &attrs, &fields)?
    } else {
        generate_opaque_shape(name)
    };
    let impl_field = if persistent && attrs.value {
        generate_value_field(name)
    } else {
        quote! {}
    };

    Ok(quote! {
        impl graphcodec::Reflect for #name {
            const NAME: &'static str = #type_name;
            const COMPACT_ID: Option<u32> = #compact_id;

            fn shape() -> graphcodec::reflect::Shape {
                #shape_body
            }
        }

        #impl_field
    })
}

// --- Generator: Shape ---

fn generate_shape(
    name: &Ident,
    attrs: &ContainerAttrs,
    fields: &[FieldInfo],
) -> syn::Result<proc_macro2::TokenStream> {
    let mut accessors = Vec::new();
    let mut field_shapes = Vec::new();
    let mut base = None;

    for (index, field) in fields.iter().enumerate() {
        let member = &field.member;
        let label = &field.label;

        if field.attrs.base {
            if base.is_some() {
                return Err(syn::Error::new_spanned(
                    &field.ty,
                    "only one field can be marked as base",
                ));
            }
            base = Some((member.clone(), field.ty.clone()));
            continue;
        }
        if field.attrs.transient {
            field_shapes.push(quote! { graphcodec::reflect::FieldShape::transient(#label) });
            continue;
        }

        let write_fn = Ident::new(&format!("__gc_write_{index}"), Span::call_site());
        let read_fn = Ident::new(&format!("__gc_read_{index}"), Span::call_site());
        accessors.push(quote! {
            fn #write_fn(
                object: &dyn ::std::any::Any,
                writer: &mut graphcodec::GraphWriter<'_>,
            ) -> graphcodec::Result<()> {
                let this = graphcodec::rt::downcast::<#name>(object)?;
                graphcodec::Field::write_field(&this.#member, writer)
            }

            fn #read_fn(
                object: &mut dyn ::std::any::Any,
                reader: &mut graphcodec::GraphReader<'_>,
            ) -> graphcodec::Result<()> {
                let this = graphcodec::rt::downcast_mut::<#name>(object)?;
                this.#member = graphcodec::Field::read_field(reader)?;
                Ok(())
            }
        });
        field_shapes.push(quote! {
            graphcodec::reflect::FieldShape::persisted(#label, #write_fn, #read_fn)
        });
    }

    let base_expr = match base {
        Some((member, ty)) => {
            accessors.push(quote! {
                fn __gc_upcast(object: &dyn ::std::any::Any) -> Option<&dyn ::std::any::Any> {
                    object
                        .downcast_ref::<#name>()
                        .map(|this| &this.#member as &dyn ::std::any::Any)
                }

                fn __gc_upcast_mut(
                    object: &mut dyn ::std::any::Any,
                ) -> Option<&mut dyn ::std::any::Any> {
                    object
                        .downcast_mut::<#name>()
                        .map(|this| &mut this.#member as &mut dyn ::std::any::Any)
                }
            });
            quote! {
                Some(graphcodec::reflect::BaseShape {
                    shape: <#ty as graphcodec::Reflect>::shape,
                    upcast: __gc_upcast,
                    upcast_mut: __gc_upcast_mut,
                })
            }
        }
        None => quote! { None },
    };

    let kind = if attrs.value {
        quote! { graphcodec::reflect::Kind::Value }
    } else {
        quote! { graphcodec::reflect::Kind::Reference }
    };
    let construct = if attrs.no_default || attrs.state {
        quote! { None }
    } else {
        quote! { Some(graphcodec::rt::construct::<#name>) }
    };
    let state = if attrs.state {
        quote! {
            Some(graphcodec::reflect::StateHooks {
                export: graphcodec::rt::export_state::<#name>,
                import: graphcodec::rt::import_state::<#name>,
            })
        }
    } else {
        quote! { None }
    };
    let callback = if attrs.callback {
        quote! { Some(graphcodec::rt::on_deserialized::<#name>) }
    } else {
        quote! { None }
    };
    let events = generate_events(name, attrs, &mut accessors);

    Ok(quote! {
        #(#accessors)*

        graphcodec::reflect::Shape {
            name: <#name as graphcodec::Reflect>::NAME,
            persistent: true,
            kind: #kind,
            fields: vec![#(#field_shapes),*],
            base: #base_expr,
            construct: #construct,
            state: #state,
            events: #events,
            callback: #callback,
        }
    })
}

/// Trampolines from `&dyn Any` to the declared event methods.
fn generate_events(
    name: &Ident,
    attrs: &ContainerAttrs,
    accessors: &mut Vec<proc_macro2::TokenStream>,
) -> proc_macro2::TokenStream {
    let mut hook = |method: &Option<Ident>, fn_name: &str, mutable: bool| match method {
        Some(method) => {
            let fn_ident = Ident::new(fn_name, Span::call_site());
            accessors.push(if mutable {
                quote! {
                    fn #fn_ident(object: &mut dyn ::std::any::Any) -> graphcodec::Result<()> {
                        graphcodec::rt::downcast_mut::<#name>(object)?.#method()
                    }
                }
            } else {
                quote! {
                    fn #fn_ident(object: &dyn ::std::any::Any) -> graphcodec::Result<()> {
                        graphcodec::rt::downcast::<#name>(object)?.#method()
                    }
                }
            });
            quote! { Some(#fn_ident) }
        }
        None => quote! { None },
    };
    let serializing = hook(&attrs.on_serializing, "__gc_on_serializing", false);
    let serialized = hook(&attrs.on_serialized, "__gc_on_serialized", false);
    let deserializing = hook(&attrs.on_deserializing, "__gc_on_deserializing", true);
    let deserialized = hook(&attrs.on_deserialized, "__gc_on_deserialized", true);

    quote! {
        graphcodec::reflect::EventHooks {
            serializing: #serializing,
            serialized: #serialized,
            deserializing: #deserializing,
            deserialized: #deserialized,
        }
    }
}

/// Shape of a `Reflect`-only type: named, but with nothing the compiler may use.
fn generate_opaque_shape(name: &Ident) -> proc_macro2::TokenStream {
    quote! {
        graphcodec::reflect::Shape {
            name: <#name as graphcodec::Reflect>::NAME,
            persistent: false,
            kind: graphcodec::reflect::Kind::Reference,
            fields: Vec::new(),
            base: None,
            construct: None,
            state: None,
            events: graphcodec::reflect::EventHooks::default(),
            callback: None,
        }
    }
}

// --- Generator: Field (value types) ---

fn generate_value_field(name: &Ident) -> proc_macro2::TokenStream {
    quote! {
        impl graphcodec::Field for #name {
            fn type_ref() -> graphcodec::value::TypeRef {
                graphcodec::value::TypeRef::of::<#name>()
            }

            fn write_field(&self, writer: &mut graphcodec::GraphWriter<'_>) -> graphcodec::Result<()> {
                writer.write_inline(self)
            }

            fn read_tagged(
                tag: graphcodec::format::Tag,
                reader: &mut graphcodec::GraphReader<'_>,
            ) -> graphcodec::Result<Self> {
                reader.read_inline_tagged(tag)
            }
        }
    }
}
