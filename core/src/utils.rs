use crate::{EscrowError, Result};

/// Assert that `res` failed with exactly `expected`.
pub fn assert_err<T, E>(res: Result<T>, expected: E)
where
    T: std::fmt::Debug,
    E: Into<EscrowError>,
{
    match res {
        Err(e) => assert_eq!(e, expected.into()),
        Ok(v) => panic!("Expected error, got Ok({v:?})"),
    }
}
