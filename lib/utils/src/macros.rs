//! Macros for defining thin newtype wrappers around plain values.

#[macro_export]
macro_rules! impl_basic {
    ($name: ident, $type: ty) => {
        impl core::convert::From<$type> for $name {
            fn from(value: $type) -> Self {
                $name { inner: value }
            }
        }
        impl core::convert::From<$name> for $type {
            fn from(value: $name) -> $type {
                value.inner
            }
        }

        impl core::ops::Deref for $name {
            type Target = $type;

            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }

        impl $name {
            pub const fn from_const(value: $type) -> Self {
                $name { inner: value }
            }
            pub const fn into_const(self) -> $type {
                self.inner
            }
        }
    };
}

/// Defines a newtype struct with [core::ops::Deref] and const conversions.
/// Supports variants: id (hashable, ordered identifiers), copy, or default.
#[macro_export]
macro_rules! define_struct {
    (id, $(#[$meta: meta])* $name: ident, $type: ty) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name {
            inner: $type,
        }

        $crate::impl_basic!($name, $type);
    };

    (copy, $(#[$meta: meta])* $name: ident, $type: ty) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone)]
        #[repr(transparent)]
        pub struct $name {
            inner: $type,
        }

        $crate::impl_basic!($name, $type);
    };

    ($(#[$meta: meta])* $name: ident, $type: ty) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[repr(transparent)]
        pub struct $name {
            inner: $type,
        }

        $crate::impl_basic!($name, $type);
    };
}
