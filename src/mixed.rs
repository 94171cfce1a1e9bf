use core::fmt;
use core::future::Future;

use crate::coroutine::Coroutine;
use crate::deferred::Deferred;

/// Any input the [resolver](crate::resolve) accepts, as a tagged union.
///
/// A mixed value is one of:
///
/// - a plain **value**, settled as-is;
/// - a **deferred** computation, awaited; its success value may itself be any
///   mixed value, and resolution recurses through it;
/// - a nullary **producer** function, invoked to obtain another mixed value;
///   an `Err` return is the producer failing outright;
/// - a **coroutine**, pumped step by step until its terminal value.
///
/// The type parameters are the settled value type `T` and the failure type
/// `E` shared by every stage of resolution.
///
/// ```
/// use settle::{resolve, Deferred, Mixed};
///
/// pollster::block_on(async {
///     let plain = Mixed::<u32, &str>::value(1);
///     assert_eq!(resolve(plain).await.outcome.unwrap(), 1);
///
///     // A producer returning a deferred returning a value: two stages,
///     // resolved to a single settled outcome.
///     let chained = Mixed::<u32, &str>::producer(|| {
///         Ok(Mixed::deferred(Deferred::resolved(2)))
///     });
///     assert_eq!(resolve(chained).await.outcome.unwrap(), 2);
/// });
/// ```
pub enum Mixed<T, E> {
    /// A plain value.
    Value(T),
    /// A deferred computation settling to another mixed value.
    Deferred(Deferred<Mixed<T, E>, E>),
    /// A nullary producer of another mixed value.
    Producer(Box<dyn FnOnce() -> Result<Mixed<T, E>, E>>),
    /// A coroutine whose terminal value is the settled value.
    Coroutine(Box<dyn Coroutine<T, E>>),
}

impl<T: 'static, E: 'static> Mixed<T, E> {
    /// A plain value.
    pub fn value(value: T) -> Self {
        Mixed::Value(value)
    }

    /// A deferred computation. A rejection settles the mixed value as a
    /// failure whose [`Origin`](crate::Origin) is
    /// [`Rejected`](crate::Origin::Rejected).
    pub fn deferred(deferred: Deferred<T, E>) -> Self {
        Mixed::Deferred(Deferred::from_future(async move {
            deferred.await.map(Mixed::Value)
        }))
    }

    /// A deferred computation settling to another mixed value; resolution
    /// continues through the settled value.
    pub fn nested(deferred: Deferred<Mixed<T, E>, E>) -> Self {
        Mixed::Deferred(deferred)
    }

    /// Adapts any `'static` future with a `Result` output.
    pub fn future(fut: impl Future<Output = Result<T, E>> + 'static) -> Self {
        Mixed::deferred(Deferred::from_future(fut))
    }

    /// A nullary producer function. An `Err` return settles the mixed value
    /// as a failure whose [`Origin`](crate::Origin) is
    /// [`Thrown`](crate::Origin::Thrown).
    pub fn producer(f: impl FnOnce() -> Result<Mixed<T, E>, E> + 'static) -> Self {
        Mixed::Producer(Box::new(f))
    }

    /// A coroutine, pumped to completion by the resolver.
    pub fn coroutine(machine: impl Coroutine<T, E> + 'static) -> Self {
        Mixed::Coroutine(Box::new(machine))
    }

    /// Which of the four kinds this mixed value is.
    pub fn kind(&self) -> Kind {
        match self {
            Mixed::Value(_) => Kind::Value,
            Mixed::Deferred(_) => Kind::Deferred,
            Mixed::Producer(_) => Kind::Producer,
            Mixed::Coroutine(_) => Kind::Coroutine,
        }
    }

    /// Whether this is a deferred computation.
    pub fn is_deferred(&self) -> bool {
        self.kind() == Kind::Deferred
    }

    /// Whether this is a producer function.
    pub fn is_producer(&self) -> bool {
        self.kind() == Kind::Producer
    }

    /// Whether this is a coroutine.
    pub fn is_coroutine(&self) -> bool {
        self.kind() == Kind::Coroutine
    }
}

impl<T: 'static, E: 'static> From<Deferred<T, E>> for Mixed<T, E> {
    fn from(deferred: Deferred<T, E>) -> Self {
        Mixed::deferred(deferred)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Mixed<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mixed::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Mixed::Deferred(_) => f.write_str("Deferred"),
            Mixed::Producer(_) => f.write_str("Producer"),
            Mixed::Coroutine(_) => f.write_str("Coroutine"),
        }
    }
}

/// The four kinds of [`Mixed`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A plain value.
    Value,
    /// A deferred computation.
    Deferred,
    /// A producer function.
    Producer,
    /// A coroutine.
    Coroutine,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Value => "value",
            Kind::Deferred => "deferred",
            Kind::Producer => "producer",
            Kind::Coroutine => "coroutine",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::coroutine::{from_fn, Step};

    #[test]
    fn kinds() {
        assert_eq!(Mixed::<u32, &str>::value(1).kind(), Kind::Value);
        assert_eq!(
            Mixed::<u32, &str>::deferred(Deferred::resolved(1)).kind(),
            Kind::Deferred
        );
        assert_eq!(
            Mixed::<u32, &str>::producer(|| Ok(Mixed::value(1))).kind(),
            Kind::Producer
        );
        let machine = from_fn(|_: Option<u32>| Ok::<_, &str>(Step::Complete(1)));
        assert_eq!(Mixed::coroutine(machine).kind(), Kind::Coroutine);
    }

    #[test]
    fn predicates_match_kinds() {
        let deferred = Mixed::<u32, &str>::deferred(Deferred::resolved(1));
        assert!(deferred.is_deferred());
        assert!(!deferred.is_producer());
        assert!(!deferred.is_coroutine());
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(
            format!("{:?}", Mixed::<u32, &str>::value(3)),
            "Value(3)"
        );
        assert_eq!(
            format!("{:?}", Mixed::<u32, &str>::producer(|| Ok(Mixed::value(1)))),
            "Producer"
        );
    }
}
