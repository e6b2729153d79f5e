//! Commands and command signatures.
//!
//! Arguments are normalized to the bytes they would occupy on the wire, so
//! `cmd("GET").arg(1)` and `cmd("GET").arg("1")` are the same command.

use bytes::Bytes;
use std::fmt;

/// A command name plus its ordered, normalized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cmd {
    name: String,
    args: Vec<Bytes>,
}

/// Start building a command.
pub fn cmd(name: impl Into<String>) -> Cmd {
    Cmd::new(name)
}

impl Cmd {
    /// Create a command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Create a command from a name and a list of arguments.
    pub fn with_args<I>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(|a| a.to_arg()).collect(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Command name, case preserved.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized arguments.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Conversion of a value into a normalized command argument.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

macro_rules! display_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

display_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

// Clients write booleans as integers.
impl ToArg for bool {
    fn to_arg(&self) -> Bytes {
        Bytes::from_static(if *self { b"1" } else { b"0" })
    }
}

/// Key a registration is matched by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    /// Name and every positional argument must be equal.
    Exact(Cmd),
    /// Name only; any argument list matches.
    Generic(String),
}

impl Signature {
    /// Command name of this signature.
    pub fn name(&self) -> &str {
        match self {
            Signature::Exact(cmd) => cmd.name(),
            Signature::Generic(name) => name,
        }
    }

    /// Whether this signature ignores arguments.
    pub fn is_generic(&self) -> bool {
        matches!(self, Signature::Generic(_))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Exact(cmd) => fmt::Display::fmt(cmd, f),
            Signature::Generic(name) => write!(f, "{} *", name),
        }
    }
}
