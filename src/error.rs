use thiserror::Error;

#[derive(Error, Debug)]
pub enum PpttError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no processor topology table available")]
    TableUnavailable,

    #[error("malformed topology table: {0}")]
    MalformedTable(&'static str),

    #[error("no leaf processor node with ACPI id {0}")]
    ProcessorNotFound(u32),

    #[error("no ACPI id mapping for logical CPU {0}")]
    UnknownCpu(u32),
}

// A convenient alias
pub type PpttResult<T> = Result<T, PpttError>;
