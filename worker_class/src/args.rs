use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::CallError;

// -------------------------------------------------------------------------------------------------------

/// The positional argument list of an annotated method, as a tuple.
///
/// Encoded as one json value per argument so the request's `data` array lines up with the parameters.
pub trait Args: Sized + Send + 'static {
    fn into_values(self) -> Result<Vec<Value>, CallError>;
    fn from_values(values: Vec<Value>) -> Result<Self, CallError>;
}

fn arity_mismatch(expected: usize, got: usize) -> CallError {
    CallError::Decode(serde::de::Error::invalid_length(
        got,
        &format!("{expected} positional arguments").as_str(),
    ))
}

macro_rules! impl_args {
    ($count:literal; $($name:ident),*) => {
        impl<$($name),*> Args for ($($name,)*)
        where
            $($name: Serialize + DeserializeOwned + Send + 'static,)*
        {
            #[allow(non_snake_case)]
            fn into_values(self) -> Result<Vec<Value>, CallError> {
                let ($($name,)*) = self;
                Ok(vec![$(serde_json::to_value($name).map_err(CallError::Encode)?),*])
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn from_values(values: Vec<Value>) -> Result<Self, CallError> {
                if values.len() != $count {
                    return Err(arity_mismatch($count, values.len()));
                }
                let mut values = values.into_iter();
                $(
                    let $name: $name = match values.next() {
                        Some(value) => serde_json::from_value(value).map_err(CallError::Decode)?,
                        None => return Err(arity_mismatch($count, 0)),
                    };
                )*
                Ok(($($name,)*))
            }
        }
    };
}

impl_args!(0;);
impl_args!(1; A1);
impl_args!(2; A1, A2);
impl_args!(3; A1, A2, A3);
impl_args!(4; A1, A2, A3, A4);
impl_args!(5; A1, A2, A3, A4, A5);
impl_args!(6; A1, A2, A3, A4, A5, A6);
impl_args!(7; A1, A2, A3, A4, A5, A6, A7);
impl_args!(8; A1, A2, A3, A4, A5, A6, A7, A8);

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
