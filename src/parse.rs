//! Helper macros for parsing packed binary structs.
//!
//! The FFF container is a handful of fixed-layout structs
//! whose byte order is only known at runtime, so parsing is
//! written against a [`ByteOrdered`] reader with a runtime
//! [`Endianness`].
#![allow(unused_macros, dead_code)]

use std::error::Error;

use anyhow::{anyhow, Result};
use byteordered::{byteorder::ReadBytesExt, ByteOrdered, Endian, Endianness};

/// Declare a [`Parseable`] struct.
///
/// A make-do for a derive macro. Supports only simple structs
/// without generics. Fields are read in declaration order;
/// `field => u16 as usize` parses a `u16` and stores it as a
/// `usize`.
macro_rules! declare_parseable_struct {
    (
        $(#[$smeta:meta])*
            $svis:vis struct $sname:ident {
                #format => $errh:expr,
                $($fvis:vis $name:ident $(as $err:expr)? => $ty:ty $(as $ty2:ty)? ),* $(,)?
            }
    ) => {

        $(#[$smeta])* #[allow(dead_code)]
            $svis struct $sname {
                $($fvis $name: declaration_type!($ty $(as $ty2)?)),*
            }

        impl crate::parse::Parseable for $sname {
            type Error = anyhow::Error;
            fn parse<T, E>(
                r: &mut byteordered::ByteOrdered<T, E>,
            ) -> std::result::Result<Self, Self::Error>
            where
                T: byteordered::byteorder::ReadBytesExt,
                E: byteordered::Endian,
            {
                parse_as_bindings!(
                    r, #format => $errh,
                    $( $name $(as $err)? => $ty $(as $ty2)? ),*
                );
                Ok($sname {
                    $( $name ),*
                })
            }
        }
    };
    (
        $(#[$smeta:meta])*
            $svis:vis struct $sname:ident {
                $($fvis:vis $name:ident $(as $err:expr)? => $ty:ty $(as $ty2:ty)? ),* $(,)?
            }
    ) => {
        declare_parseable_struct! {
            $(#[$smeta])*
                $svis struct $sname {
                    #format => |e| format!("parsing field `{}.{}`", stringify!($sname), e),
                    $($fvis $name $(as $err)? => $ty $(as $ty2)?),*
                }
        }
    };
}

/// Declare multiple [`Parseable`] structs.
macro_rules! declare_parseable_structs {
    (
        $(
            $(#[$smeta:meta])*
                $svis:vis struct $sname:ident {
                    $($tt:tt)*
                }
        )*
    ) => {
        $(
            declare_parseable_struct! {
                $(#[$smeta])*
                    $svis struct $sname {
                        $($tt)*
                    }
            }
        )*
    };
}

/// Expands to the parsed type or the converted type.
macro_rules! declaration_type {
    ($ty:ty as $ty2:ty) => {
        $ty2
    };
    ($ty:ty) => {
        $ty
    };
}

/// Generate `let` bindings by parsing a reader. The reader
/// must be a `&mut ByteOrdered<_, _>`.
macro_rules! parse_as_bindings {
    (
        $rdr: expr $(, #format => $errh:expr)?,
        $( $name:ident $(as $err:expr)? => $ty:ty $(as $ty2:ty)? ),* $(,)?
    ) => {
        #[allow(unused_parens)]
        let ($($name),*) = parse_from_reader!(
            $rdr $(, $errh)?,
            $( $ty $(as $ty2)? => stringify_binding!($name $(as $err)?) ),*
        );
    };
}

/// Error context is the given expression, or the
/// identifier name.
macro_rules! stringify_binding {
    ($name: ident as $err:expr) => {
        $err
    };
    ($name: ident) => {
        stringify!($name)
    };
}

/// Evaluates to a tuple of values parsed from a reader.
macro_rules! parse_from_reader {
    ($rdr: expr, $errh: expr, $( $ty:ty $(as $ty2:ty)? => $err:expr ),* $(,)?) => {{
        let rdr = $rdr;
        ($(
            anyhow::Context::with_context(
                <$ty as crate::parse::Parseable>::parse(&mut *rdr), || ($errh)($err)
            )? $(as $ty2)?
        ),*)
    }};
    ($rdr: expr, $( $ty:ty $(as $ty2:ty)? => $err:expr ),* $(,)?) => {{
        parse_from_reader!($rdr, |e| format!("field `{}`", e), $( $ty $(as $ty2)? => $err ),*)
    }};
}

pub(crate) trait Parseable: Sized {
    type Error;
    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> Result<Self, Self::Error>;
}

use std::io::Error as IOError;
macro_rules! impl_parseable {
    ($ty:ty, $method:ident) => {
        impl Parseable for $ty {
            type Error = IOError;
            fn parse<T: ReadBytesExt, E: Endian>(
                r: &mut ByteOrdered<T, E>,
            ) -> Result<Self, IOError> {
                r.$method()
            }
        }
    };
}

impl_parseable!(u8, read_u8);
impl_parseable!(i8, read_i8);
impl_parseable!(u16, read_u16);
impl_parseable!(i16, read_i16);
impl_parseable!(u32, read_u32);
impl_parseable!(i32, read_i32);
impl_parseable!(u64, read_u64);
impl_parseable!(i64, read_i64);
impl_parseable!(f64, read_f64);
impl_parseable!(f32, read_f32);

impl<Ty, const N: usize> Parseable for [Ty; N]
where
    Ty: Parseable,
    <Ty as Parseable>::Error: Send + Sync + Error + 'static,
    [Ty; N]: Default,
{
    type Error = anyhow::Error;
    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> Result<Self, Self::Error> {
        let mut out: [Ty; N] = Default::default();
        for slot in out.iter_mut() {
            *slot = Ty::parse(r)?;
        }
        Ok(out)
    }
}

/// Parse a `P` starting at `offset` of `data`.
pub(crate) fn parse_at<P>(data: &[u8], offset: usize, endian: Endianness) -> Result<P>
where
    P: Parseable,
    P::Error: Into<anyhow::Error>,
{
    let slice = data.get(offset..).ok_or_else(|| {
        anyhow!(
            "offset {:#x} beyond end of data ({} bytes)",
            offset,
            data.len()
        )
    })?;
    let mut rdr = ByteOrdered::runtime(slice, endian);
    P::parse(&mut rdr).map_err(Into::into)
}

/// Byte order of an FFF image/camera record.
///
/// Records begin with a `u16` marker that reads `2` in the
/// record's own byte order.
pub(crate) fn marker_endianness(record: &[u8]) -> Result<Endianness> {
    let marker: u16 = parse_at(record, 0, Endianness::Little)?;
    Ok(if marker == 2 {
        Endianness::Little
    } else {
        Endianness::Big
    })
}

/// Decode a NUL-padded fixed-width string.
pub(crate) fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    declare_parseable_structs! {
        pub struct Dims {
            pub(crate) width => u16 as usize,
            pub(crate) height => u16 as usize,
        }

        pub struct Header {
            #format => |e| format!("parsing `Header.{}` (custom message)", e),
            signature => [u8; 4],
            dims => Dims,
        }
    }

    #[test]
    fn parses_declared_structs_in_both_orders() -> Result<()> {
        let data = [b'F', b'F', b'F', 0, 0x01, 0x40, 0x00, 0xf0];

        let be: Header = parse_at(&data, 0, Endianness::Big)?;
        assert_eq!(&be.signature, b"FFF\0");
        assert_eq!((be.dims.width, be.dims.height), (0x140, 0xf0));

        let le: Dims = parse_at(&data, 4, Endianness::Little)?;
        assert_eq!((le.width, le.height), (0x4001, 0xf000));
        Ok(())
    }

    #[test]
    fn truncated_input_names_field() {
        let data = [b'F', b'F', b'F', 0, 0x01, 0x40, 0x00];
        let err = parse_at::<Header>(&data, 0, Endianness::Big)
            .err()
            .expect("truncated header must fail");
        let msg = format!("{:#}", err);
        assert!(msg.contains("Header.dims"), "{}", msg);
        assert!(msg.contains("Dims.height"), "{}", msg);
    }

    #[test]
    fn bindings_from_reader() -> Result<()> {
        let slice: Vec<u8> = vec![0, 0, 0, 7, 1, 2, 3, 4];
        let mut rdr = ByteOrdered::be(&slice[..]);
        parse_as_bindings! {
            &mut rdr,
            #format => |e| format!("binding field {}", e),
            count as "count" => u32 as usize,
            _reserved as "reserved" => [u8; 4],
        }
        assert_eq!(count, 7);
        Ok(())
    }

    #[test]
    fn offset_past_end() {
        assert!(parse_at::<u16>(&[0u8; 4], 5, Endianness::Big).is_err());
        assert!(parse_at::<u32>(&[0u8; 4], 2, Endianness::Big).is_err());
    }

    #[test]
    fn record_marker() -> Result<()> {
        assert_eq!(marker_endianness(&[2, 0])?, Endianness::Little);
        assert_eq!(marker_endianness(&[0, 2])?, Endianness::Big);
        Ok(())
    }

    #[test]
    fn fixed_strings() {
        assert_eq!(fixed_str(b"FLIR E8\0\0\0"), "FLIR E8");
        assert_eq!(fixed_str(b"no-nul"), "no-nul");
    }
}
