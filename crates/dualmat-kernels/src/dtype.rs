//! Element types accepted by device kernels.
//!
//! Only the scalar types listed here have an OpenCL C counterpart. The trait is sealed,
//! so asking for a kernel over any other type is rejected by the compiler:
//!
//! ```compile_fail
//! use dualmat_kernels::DeviceElement;
//!
//! fn type_name<T: DeviceElement>() -> &'static str {
//!     T::DEVICE_TYPE
//! }
//!
//! type_name::<char>();
//! ```

mod private {
    pub trait Sealed {}
}

/// A scalar type with a fixed OpenCL C representation.
pub trait DeviceElement: private::Sealed + Copy + Send + Sync + 'static {
    /// The OpenCL C type name.
    const DEVICE_TYPE: &'static str;

    /// Whether kernels over this type need the `cl_khr_fp64` extension.
    const NEEDS_FP64: bool = false;

    /// Whether every byte pattern of the right size is a valid value.
    const ANY_BIT_PATTERN: bool = true;

    /// Rewrites bytes read back from a device into valid values of `Self`.
    ///
    /// Only needed when [`Self::ANY_BIT_PATTERN`] is false.
    fn canonicalize(_bytes: &mut [u8]) {}

    /// Renders `self` as an OpenCL C expression of type [`Self::DEVICE_TYPE`].
    fn literal(self) -> String;
}

macro_rules! impl_integer {
    ($ty:ty, $cl:literal) => {
        impl private::Sealed for $ty {}

        impl DeviceElement for $ty {
            const DEVICE_TYPE: &'static str = $cl;

            fn literal(self) -> String {
                format!("(({}){})", Self::DEVICE_TYPE, self)
            }
        }
    };
    ($ty:ty, $cl:literal, $suffix:literal) => {
        impl private::Sealed for $ty {}

        impl DeviceElement for $ty {
            const DEVICE_TYPE: &'static str = $cl;

            fn literal(self) -> String {
                format!("(({}){}{})", Self::DEVICE_TYPE, self, $suffix)
            }
        }
    };
}

impl_integer!(i8, "char");
impl_integer!(u8, "uchar");
impl_integer!(i16, "short");
impl_integer!(u16, "ushort");
impl_integer!(i32, "int");
impl_integer!(u32, "uint", "u");
impl_integer!(u64, "ulong", "UL");

#[cfg(target_pointer_width = "64")]
impl_integer!(usize, "ulong", "UL");
#[cfg(target_pointer_width = "32")]
impl_integer!(usize, "uint", "u");
#[cfg(target_pointer_width = "32")]
impl_integer!(isize, "int");

impl private::Sealed for i64 {}

impl DeviceElement for i64 {
    const DEVICE_TYPE: &'static str = "long";

    fn literal(self) -> String {
        if self == i64::MIN {
            // the positive half of i64::MIN does not fit a long literal
            "LONG_MIN".to_string()
        } else {
            format!("((long){self}L)")
        }
    }
}

#[cfg(target_pointer_width = "64")]
impl private::Sealed for isize {}

#[cfg(target_pointer_width = "64")]
impl DeviceElement for isize {
    const DEVICE_TYPE: &'static str = "long";

    fn literal(self) -> String {
        (self as i64).literal()
    }
}

impl private::Sealed for bool {}

impl DeviceElement for bool {
    const DEVICE_TYPE: &'static str = "uchar";
    const ANY_BIT_PATTERN: bool = false;

    fn canonicalize(bytes: &mut [u8]) {
        for b in bytes.iter_mut() {
            *b = u8::from(*b != 0);
        }
    }

    fn literal(self) -> String {
        let v = if self { "((uchar)1)" } else { "((uchar)0)" };
        v.to_string()
    }
}

impl private::Sealed for f32 {}

impl DeviceElement for f32 {
    const DEVICE_TYPE: &'static str = "float";

    fn literal(self) -> String {
        if self.is_nan() {
            "NAN".to_string()
        } else if self.is_infinite() {
            let v = if self > 0.0 { "INFINITY" } else { "(-INFINITY)" };
            v.to_string()
        } else {
            format!("({self:?}f)")
        }
    }
}

impl private::Sealed for f64 {}

impl DeviceElement for f64 {
    const DEVICE_TYPE: &'static str = "double";
    const NEEDS_FP64: bool = true;

    fn literal(self) -> String {
        if self.is_nan() {
            "((double)NAN)".to_string()
        } else if self.is_infinite() {
            let v = if self > 0.0 {
                "((double)INFINITY)"
            } else {
                "((double)-INFINITY)"
            };
            v.to_string()
        } else {
            format!("((double){self:?})")
        }
    }
}
