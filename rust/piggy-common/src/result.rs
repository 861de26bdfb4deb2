//! `Result` alias and the early-return checks used across the piggy crates.
//!
//! `verify_arg!` guards caller-supplied values and fails with
//! [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument);
//! `verify_data!` guards values decoded from storage and fails with
//! [`ErrorKind::Encoding`](crate::error::ErrorKind::Encoding). Both name the checked
//! element and, unless a message is given, quote the failed condition.

use crate::error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $cond:expr $(,)?) => {
        if !($cond) {
            return Err($crate::result::failed_arg_check(
                stringify!($name),
                stringify!($cond),
            )
            .into());
        }
    };
    ($name:expr, $cond:expr, $($msg:tt)+) => {
        if !($cond) {
            return Err($crate::error::Error::invalid_arg(stringify!($name), format!($($msg)+)).into());
        }
    };
}

#[macro_export]
macro_rules! verify_data {
    ($name:expr, $cond:expr $(,)?) => {
        if !($cond) {
            return Err($crate::result::failed_data_check(
                stringify!($name),
                stringify!($cond),
            )
            .into());
        }
    };
    ($name:expr, $cond:expr, $($msg:tt)+) => {
        if !($cond) {
            return Err($crate::error::Error::encoding(stringify!($name), format!($($msg)+)).into());
        }
    };
}

#[cold]
pub fn failed_arg_check(name: &str, condition: &str) -> Error {
    Error::invalid_arg(name, format!("expected `{condition}`"))
}

#[cold]
pub fn failed_data_check(element: &str, condition: &str) -> Error {
    Error::encoding(element, format!("expected `{condition}`"))
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    fn check(len: usize) -> crate::Result<()> {
        verify_arg!(len, len > 0);
        verify_data!(len, len < 10);
        verify_data!(len, len != 7, "length {len} is reserved");
        Ok(())
    }

    #[test]
    fn test_verify_macros() {
        assert!(check(5).is_ok());
        assert!(matches!(
            check(0).unwrap_err().into_kind(),
            ErrorKind::InvalidArgument { .. }
        ));

        let err = check(20).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid encoding of 'len': expected `len < 10`"
        );

        match check(7).unwrap_err().into_kind() {
            ErrorKind::Encoding { element, message } => {
                assert_eq!(element, "len");
                assert_eq!(message, "length 7 is reserved");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
