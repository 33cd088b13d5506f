//! # dotnet-access
//!
//! Reflective member resolution and accessor synthesis over .NET-style type
//! metadata.
//!
//! - **[`resolver`]**: name-based lookup of fields, properties, methods,
//!   constructors and nested types, declared or inherited, plus virtual and
//!   interface dispatch.
//! - **[`accessor`]**: by-reference field accessors for class, struct and
//!   static fields, validated against the requested types before anything is
//!   generated.
//! - **[`invoker`]**: method delegates with open or closed receivers and
//!   virtual or exact dispatch.
//! - **[`codegen`]**: the fragment representation accessors and invokers are
//!   generated from, and the backends that run it.
//! - **[`copy`]**: deep copies across types with matching field names.
//!
//! Metadata comes from a [`types::MetadataProvider`]: either built by hand with
//! [`types::registry::RegistryBuilder`] or, with the `assembly` feature,
//! imported from a managed assembly.
pub mod accessor;
#[cfg(feature = "assembly")]
pub mod assemblies;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod copy;
pub mod error;
pub mod invoker;
pub mod resolver;
pub mod runtime;
pub mod types;
pub mod value;

pub use accessor::{AccessSpec, FieldAccessor, StaticFieldAccessor, StructFieldAccessor};
pub use config::RuntimeConfig;
pub use invoker::{DelegateSignature, Invoke, Invoker};
pub use resolver::MemberResolver;
pub use runtime::Runtime;
pub use value::{ManagedPtr, Value};
