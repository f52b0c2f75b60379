use crate::util::bail;

use proc_macro2::{Ident, TokenStream};
use quote::{ToTokens, format_ident, quote};
use syn::{
    Attribute, FnArg, GenericArgument, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, PathArguments,
    ReturnType, Type,
};

// Usage
// -----------------------------------------------------------------------------------------------------------------------------------

// Applied to an inherent impl block. Each method marked #[coordinator] or #[worker] is split in two:
// the body moves into a hidden local method, and a proxy with the original name and signature routes
// the call. All marked methods are also registered in a `::worker_class::Routed` impl, which is what the
// receiving side dispatches through.

// -----------------------------------------------------------------------------------------------------------------------------------
// <begin of example>

#[cfg(false)]
#[::worker_class::methods]
impl Counter {
    #[worker]
    async fn increment_worker_counter(&self, by: i64) -> anyhow::Result<i64> {
        Ok(self.worker_counter.fetch_add(by, Ordering::SeqCst) + by)
    }
}

// expands to

#[cfg(false)]
impl Counter {
    #[doc(hidden)]
    async fn __worker_class_local_increment_worker_counter(&self, by: i64) -> anyhow::Result<i64> {
        Ok(self.worker_counter.fetch_add(by, Ordering::SeqCst) + by)
    }

    async fn increment_worker_counter(&self, by: i64) -> anyhow::Result<i64> {
        <Self as ::worker_class::WorkerClass>::link(self)
            .route(
                ::worker_class::Context::Worker,
                "increment_worker_counter",
                (by,),
                move |(by,)| self.__worker_class_local_increment_worker_counter(by),
            )
            .await
    }
}

#[cfg(false)]
impl ::worker_class::Routed for Counter {
    #[allow(unused_variables)]
    fn register(methods: &mut ::worker_class::MethodTableBuilder<Self>) {
        methods.method(
            ::worker_class::Context::Worker,
            "increment_worker_counter",
            |this: ::worker_class::__private::Arc<Self>, (by,): (i64,)| async move {
                this.__worker_class_local_increment_worker_counter(by).await
            },
        );
    }
}

// <end of example>
// -----------------------------------------------------------------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Home {
    Coordinator,
    Worker,
}

impl Home {
    fn marker(self) -> &'static str {
        match self {
            Home::Coordinator => "coordinator",
            Home::Worker => "worker",
        }
    }

    fn context(self) -> TokenStream {
        match self {
            Home::Coordinator => quote!(::worker_class::Context::Coordinator),
            Home::Worker => quote!(::worker_class::Context::Worker),
        }
    }
}

struct Marker {
    home: Home,
    /// overrides the wire name, e.g. to talk to a peer that uses camelCase names
    name: Option<LitStr>,
}

fn marker_home(attr: &Attribute) -> Option<Home> {
    let path = attr.path();
    if path.is_ident("coordinator") {
        Some(Home::Coordinator)
    } else if path.is_ident("worker") {
        Some(Home::Worker)
    } else {
        None
    }
}

/// Finds the #[coordinator] / #[worker] marker of a method and removes it from its attributes.
fn take_marker(function: &mut ImplItemFn) -> syn::Result<Option<Marker>> {
    let mut marker: Option<Marker> = None;
    let mut rest = Vec::new();

    for attr in std::mem::take(&mut function.attrs) {
        let Some(home) = marker_home(&attr) else {
            rest.push(attr);
            continue;
        };

        if marker.is_some() {
            return bail!(
                &attr,
                "a method can carry only one of #[coordinator] and #[worker]"
            );
        }

        let mut name = None;
        if matches!(attr.meta, syn::Meta::List(_)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    name = Some(meta.value()?.parse::<LitStr>()?);
                    Ok(())
                } else {
                    Err(meta.error(format!(
                        "unsupported argument for #[{}], expected `name = \"...\"`",
                        home.marker()
                    )))
                }
            })?;
        }

        marker = Some(Marker { home, name });
    }

    function.attrs = rest;
    Ok(marker)
}

// -----------------------------------------------------------------------------------------------------------------------------------

pub fn methods_impl(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return bail!(attr, "#[methods] takes no arguments");
    }

    let mut item_impl: ItemImpl = syn::parse2(item)?;
    if let Some((_, path, _)) = &item_impl.trait_ {
        return bail!(
            path,
            "#[methods] must be used on an inherent impl block, not on a trait impl"
        );
    }

    let mut items = Vec::new();
    let mut registrations = Vec::new();

    for impl_item in std::mem::take(&mut item_impl.items) {
        let ImplItem::Fn(mut function) = impl_item else {
            items.push(impl_item);
            continue;
        };

        let Some(marker) = take_marker(&mut function)? else {
            items.push(ImplItem::Fn(function));
            continue;
        };

        let split = split_method(function, marker)?;
        items.push(ImplItem::Fn(split.local));
        items.push(ImplItem::Fn(split.proxy));
        registrations.push(split.registration);
    }

    item_impl.items = items;

    let self_ty = &item_impl.self_ty;
    let (impl_generics, _, where_clause) = item_impl.generics.split_for_impl();

    Ok(quote! {
        #item_impl

        impl #impl_generics ::worker_class::Routed for #self_ty #where_clause {
            #[allow(unused_variables)]
            fn register(methods: &mut ::worker_class::MethodTableBuilder<Self>) {
                #(#registrations)*
            }
        }
    })
}

/// The first reference or non-`'static` lifetime inside `ty`, if any.
fn find_borrow(ty: &Type) -> Option<&dyn ToTokens> {
    match ty {
        Type::Reference(reference) => Some(reference as &dyn ToTokens),
        Type::Paren(inner) => find_borrow(&inner.elem),
        Type::Group(inner) => find_borrow(&inner.elem),
        Type::Slice(inner) => find_borrow(&inner.elem),
        Type::Array(inner) => find_borrow(&inner.elem),
        Type::Tuple(tuple) => tuple.elems.iter().find_map(find_borrow),
        Type::Path(path) => {
            if let Some(qself) = &path.qself {
                if let Some(found) = find_borrow(&qself.ty) {
                    return Some(found);
                }
            }
            path.path.segments.iter().find_map(|segment| {
                let PathArguments::AngleBracketed(args) = &segment.arguments else {
                    return None;
                };
                args.args.iter().find_map(|arg| match arg {
                    GenericArgument::Type(ty) => find_borrow(ty),
                    GenericArgument::Lifetime(lifetime) if lifetime.ident != "static" => {
                        Some(lifetime as &dyn ToTokens)
                    }
                    _ => None,
                })
            })
        }
        _ => None,
    }
}

struct SplitMethod {
    local: ImplItemFn,
    proxy: ImplItemFn,
    registration: TokenStream,
}

fn split_method(function: ImplItemFn, marker: Marker) -> syn::Result<SplitMethod> {
    let sig = &function.sig;
    let name = &sig.ident;
    let marker_name = marker.home.marker();

    let Some(receiver) = sig.receiver() else {
        return bail!(
            sig,
            "#[{}] must be used on instance methods, `{}` has no `self` receiver",
            marker_name,
            name
        );
    };
    if receiver.reference.is_none()
        || receiver.mutability.is_some()
        || receiver.colon_token.is_some()
    {
        return bail!(
            receiver,
            "#[{}] methods must take `&self`, the instance is shared with the channel",
            marker_name
        );
    }
    if sig.asyncness.is_none() {
        return bail!(sig, "#[{}] must be used on `async fn` methods", marker_name);
    }
    if !sig.generics.params.is_empty() {
        return bail!(&sig.generics, "#[{}] methods cannot be generic", marker_name);
    }
    if let Some(variadic) = &sig.variadic {
        return bail!(variadic, "#[{}] methods cannot be variadic", marker_name);
    }
    if let ReturnType::Default = sig.output {
        return bail!(
            sig,
            "#[{}] methods must return `anyhow::Result<_>`, the call may fail on the other side",
            marker_name
        );
    }

    let mut arg_idents: Vec<Ident> = Vec::new();
    let mut arg_types: Vec<Type> = Vec::new();
    for input in sig.inputs.iter() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        match &*pat_type.pat {
            Pat::Ident(pat) if pat.by_ref.is_none() && pat.subpat.is_none() => {
                if let Some(borrowed) = find_borrow(&pat_type.ty) {
                    return bail!(
                        borrowed,
                        "#[{}] methods take owned arguments, `{}` borrows; arguments cross the channel by value",
                        marker_name,
                        pat.ident
                    );
                }
                arg_idents.push(pat.ident.clone());
                arg_types.push((*pat_type.ty).clone());
            }
            other => {
                return bail!(
                    other,
                    "#[{}] methods need plain identifiers as argument patterns",
                    marker_name
                );
            }
        }
    }

    let wire_name = marker
        .name
        .unwrap_or_else(|| LitStr::new(&name.to_string(), name.span()));
    let context = marker.home.context();
    let local_ident = format_ident!("__worker_class_local_{}", name);

    // the original body, under a hidden name; this is what runs on the method's home side
    let mut local = function.clone();
    local.sig.ident = local_ident.clone();
    local.vis = syn::Visibility::Inherited;
    local.attrs.retain(|attr| !attr.path().is_ident("doc"));
    local.attrs.push(syn::parse_quote!(#[doc(hidden)]));

    let attrs = &function.attrs;
    let vis = &function.vis;
    let output = &sig.output;

    let proxy: ImplItemFn = syn::parse_quote! {
        #(#attrs)*
        #vis async fn #name(&self, #(#arg_idents: #arg_types),*) #output {
            <Self as ::worker_class::WorkerClass>::link(self)
                .route(
                    #context,
                    #wire_name,
                    (#(#arg_idents,)*),
                    move |(#(#arg_idents,)*)| self.#local_ident(#(#arg_idents),*),
                )
                .await
        }
    };

    let registration = quote! {
        methods.method(
            #context,
            #wire_name,
            |this: ::worker_class::__private::Arc<Self>, (#(#arg_idents,)*): (#(#arg_types,)*)| async move {
                this.#local_ident(#(#arg_idents),*).await
            },
        );
    };

    Ok(SplitMethod {
        local,
        proxy,
        registration,
    })
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
