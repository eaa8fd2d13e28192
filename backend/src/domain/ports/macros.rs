//! Helper macro generating port error enums with snake-case constructors.
//!
//! Each variant becomes a `thiserror` variant with the given display string
//! and a constructor named after it that accepts `impl Into<T>` per field.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Constructor generation for port error enums.
    define_port_error! {
        pub enum ExampleStoreError {
            Backend { message: String } => "backend: {message}",
            Duplicate { part: u32 } => "duplicate part {part}",
            Rejected { message: String, part: u32 } => "rejected {message} at part {part}",
        }
    }

    #[test]
    fn constructors_accept_str_for_string_fields() {
        let err = ExampleStoreError::backend("redis down");
        assert_eq!(err.to_string(), "backend: redis down");
    }

    #[test]
    fn constructors_preserve_non_string_types() {
        let err = ExampleStoreError::duplicate(3_u32);
        assert_eq!(err, ExampleStoreError::Duplicate { part: 3 });
    }

    #[test]
    fn constructors_support_mixed_fields() {
        let err = ExampleStoreError::rejected("queue full", 7_u32);
        assert_eq!(err.to_string(), "rejected queue full at part 7");
    }
}
