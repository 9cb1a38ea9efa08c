#![macro_use]

macro_rules! fail {
    ($expr:expr) => {
        return Err(::std::convert::From::from($expr))
    };
}

macro_rules! invalid_type_error {
    ($v:expr, $det:expr) => {{
        fail!($crate::RedisError::from((
            $crate::ErrorKind::UnexpectedReturnType,
            "Response was of incompatible type",
            format!("{:?} (response was {:?})", $det, $v),
        )))
    }};
}
