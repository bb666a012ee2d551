//! Error types for the CampusOS kernel
//!
//! Caller-visible, recoverable failures are expressed as [`KernelError`]
//! values. Structural violations inside the scheduling core (stack-guard
//! corruption, pid-space exhaustion at fork time, destroying the running
//! thread, idling with nothing to wake) are not representable here: once the
//! dispatcher's bookkeeping is corrupted no other part of the kernel can be
//! trusted, so those paths halt the kernel with a panic diagnostic instead.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A fixed-capacity kernel resource has no free slot left.
    ResourceExhausted { resource: &'static str },
    /// The pid named in a join request is not a child of the caller.
    NotAChild { pid: u32 },
    /// A bounded queue was asked to hold more entries than its capacity.
    QueueFull { capacity: usize },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted { resource } => {
                write!(f, "resource exhausted: {resource}")
            }
            Self::NotAChild { pid } => {
                write!(f, "pid {pid} is not a child of the calling thread")
            }
            Self::QueueFull { capacity } => {
                write!(f, "queue full (capacity {capacity})")
            }
        }
    }
}

/// Result type alias using KernelError
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelError::ResourceExhausted { resource: "pid space" };
        assert_eq!(format!("{err}"), "resource exhausted: pid space");

        let err = KernelError::NotAChild { pid: 42 };
        assert_eq!(
            format!("{err}"),
            "pid 42 is not a child of the calling thread"
        );

        let err = KernelError::QueueFull { capacity: 128 };
        assert_eq!(format!("{err}"), "queue full (capacity 128)");
    }
}
