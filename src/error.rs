use thiserror::Error;

/// Hard resolution failures. A member that simply does not exist is not an
/// error: resolver lookups return `None` and log through `tracing`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Ambiguous match for {type_name}:{member} between {}", candidates.join(", "))]
    Ambiguous {
        type_name: String,
        member: String,
        candidates: Vec<String>,
    },
    #[error("Method must be specified as 'Namespace.Type1.Type2:MethodName', got '{0}'")]
    MalformedMethodPath(String),
}

/// Rejections from the type compatibility rules, raised before any code is generated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IncompatibleType {
    #[error(
        "requested type {requested} must be the same as field type {actual} or its underlying integral type ({underlying}) for enum types"
    )]
    EnumField {
        requested: String,
        actual: String,
        underlying: String,
    },
    #[error("requested type {requested} must be the same as field type {actual} for value types")]
    ValueField { requested: String, actual: String },
    #[error(
        "requested type {requested} must be assignable from field type {actual} for reference types"
    )]
    ReferenceField { requested: String, actual: String },
    #[error("receiver type {requested} must not be a value type")]
    ValueTypeReceiver { requested: String },
    #[error(
        "declaring type {declaring} must be assignable from or to receiver type {requested} (\"instance of {requested} is {declaring}\" must be possible)"
    )]
    UnrelatedReceiver { requested: String, declaring: String },
    #[error("declaring type {declaring} must be the struct receiver type {requested}")]
    StructReceiver { requested: String, declaring: String },
}

/// Failures of the code-generation backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("code generation is unavailable on backend {backend}: {reason}")]
    Unsupported { backend: String, reason: String },
    #[error("invalid fragment {fragment} at instruction {offset}: {reason}")]
    InvalidFragment {
        fragment: String,
        offset: usize,
        reason: String,
    },
    #[error("fragment {fragment} calls {method}, which has no body")]
    MissingBody { fragment: String, method: String },
    #[error("fragment {fragment} refers to {field}, which has no storage slot")]
    UnknownField { fragment: String, field: String },
    #[error("running {fragment} during generation failed: {source}")]
    Execution {
        fragment: String,
        #[source]
        source: ExecutionError,
    },
}

/// Rejected accessor synthesis requests. `request` names the request form and
/// the requested types, e.g. `FieldRefAccess<Zoo.Dog, System.Int32>`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessError {
    #[error("{request}: could not find field {field} on {type_name}")]
    MissingField {
        request: String,
        type_name: String,
        field: String,
    },
    #[error("{request}: field {field} must not be static")]
    StaticField { request: String, field: String },
    #[error("{request}: field {field} must be static")]
    InstanceField { request: String, field: String },
    #[error(
        "{request}: either the declaring type {declaring} of {field} must be a class or the field must be static"
    )]
    StructInstanceField {
        request: String,
        field: String,
        declaring: String,
    },
    #[error("{request}: receiver type {receiver} must be a struct")]
    NotAStruct { request: String, receiver: String },
    #[error("{request} for {field}: {source}")]
    Incompatible {
        request: String,
        field: String,
        #[source]
        source: IncompatibleType,
    },
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Rejected invoker binding requests.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    #[error("Interface methods must be called virtually ({method})")]
    InterfaceRequiresVirtual { method: String },
    #[error("Invalid delegate type for {method}: {reason}")]
    InvalidSignature { method: String, reason: String },
    #[error("{type_name} does not map {method} for interface {interface}")]
    NoInterfaceMapping {
        type_name: String,
        interface: String,
        method: String,
    },
    #[error("cannot bind {method} non-virtually to an instance of {actual}")]
    ReceiverMismatch { method: String, actual: String },
    #[error("could not resolve an implementation of {method} for {type_name}")]
    Unresolved { method: String, type_name: String },
    #[error("{method} has no body")]
    MissingBody { method: String },
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Faults raised while running a synthesized accessor or invoker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Unable to cast object of type '{actual}' to type '{expected}'")]
    InvalidCast { expected: String, actual: String },
    #[error("Object reference not set to an instance of an object")]
    NullReference,
    #[error("{target}: argument {index} expected {expected}, got {actual}")]
    ArgumentType {
        target: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("{target} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        target: String,
        expected: usize,
        actual: usize,
    },
    #[error("{0} has no body")]
    MissingBody(String),
    #[error("unknown member {0}")]
    UnknownMember(String),
    #[error("cannot store a value of type {actual} in {target} of type {expected}")]
    TypeMismatch {
        target: String,
        expected: String,
        actual: String,
    },
    #[error("slot {slot} is out of range for an instance of {type_name}")]
    InvalidSlot { type_name: String, slot: usize },
    #[error("slot {slot} of {type_name} is already borrowed")]
    SlotBorrowed { type_name: String, slot: usize },
    #[error("{method} cannot be called on a receiver of type {actual}")]
    UnsupportedReceiver { method: String, actual: String },
    #[error("{0} produced an unexpected result")]
    UnexpectedResult(String),
    #[error("invalid program in {fragment}: {reason}")]
    InvalidProgram { fragment: String, reason: String },
    #[error("cannot create an instance of {0}")]
    Uninstantiable(String),
    #[error("{0}")]
    Native(String),
}

/// Deep copy failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CopyError {
    #[error("{type_name} has an append strategy but cannot be enumerated")]
    NotEnumerable { type_name: String },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Failures while importing type metadata from a managed assembly.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse {path} as .NET metadata: {reason}")]
    Parse { path: String, reason: String },
}
