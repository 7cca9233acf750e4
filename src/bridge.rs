//! Event/ack bridge between native listener calls and application callbacks.
//!
//! Native socket libraries deliver an event as a variadic argument list
//! whose last element may be the peer's acknowledgment handle. The bridge:
//!
//! 1. pops the last argument and asks the platform whether it has the
//!    ack-handle shape ([`AckCandidate::into_ack`]); if not it goes back
//!    onto the payload,
//! 2. demarshals every payload argument,
//! 3. turns the ack handle, if any, into an [`Ack`] reverse closure that
//!    marshals the application's response back to native values.
//!
//! Only the last position is ever considered. A handle-shaped value anywhere
//! else is payload and demarshals to `Undefined`.

use crate::client::{Ack, Args};
use crate::value::Value;

/// A native argument that might be the peer's acknowledgment handle.
pub trait AckCandidate: Sized {
    /// Native callable handle type.
    type Handle;

    /// Return the handle when `self` has the ack shape, otherwise give the
    /// argument back unchanged.
    fn into_ack(self) -> Result<Self::Handle, Self>;
}

/// Split a native argument list into payload and trailing ack handle.
pub fn split_ack<A: AckCandidate>(mut args: Vec<A>) -> (Vec<A>, Option<A::Handle>) {
    let Some(last) = args.pop() else {
        return (args, None);
    };

    match last.into_ack() {
        Ok(handle) => (args, Some(handle)),
        Err(data) => {
            args.push(data);
            (args, None)
        }
    }
}

/// Run the full bridge over one native delivery.
///
/// `deserialize` demarshals a payload argument; `reverse` builds the reverse
/// closure around the native ack handle.
pub fn demux<A, D, R>(args: Vec<A>, deserialize: D, reverse: R) -> Args
where
    A: AckCandidate,
    D: FnMut(A) -> Value,
    R: FnOnce(A::Handle) -> Ack,
{
    let (payload, handle) = split_ack(args);
    let values = payload.into_iter().map(deserialize).collect();
    Args::new(values, handle.map(reverse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    enum Raw {
        Data(i32),
        Callback(&'static str),
    }

    impl AckCandidate for Raw {
        type Handle = &'static str;

        fn into_ack(self) -> Result<Self::Handle, Self> {
            match self {
                Raw::Callback(name) => Ok(name),
                other => Err(other),
            }
        }
    }

    fn to_value(raw: Raw) -> Value {
        match raw {
            Raw::Data(n) => Value::from(n),
            Raw::Callback(_) => Value::Undefined,
        }
    }

    #[test]
    fn test_split_empty_has_no_ack() {
        let (payload, ack) = split_ack::<Raw>(vec![]);
        assert!(payload.is_empty());
        assert!(ack.is_none());
    }

    #[test]
    fn test_split_trailing_handle() {
        let (payload, ack) = split_ack(vec![Raw::Data(1), Raw::Data(2), Raw::Callback("cb")]);
        assert_eq!(payload, vec![Raw::Data(1), Raw::Data(2)]);
        assert_eq!(ack, Some("cb"));
    }

    #[test]
    fn test_split_trailing_data_is_pushed_back() {
        let (payload, ack) = split_ack(vec![Raw::Data(1), Raw::Data(2)]);
        assert_eq!(payload, vec![Raw::Data(1), Raw::Data(2)]);
        assert!(ack.is_none());
    }

    #[test]
    fn test_handle_in_middle_is_payload() {
        let args = demux(
            vec![Raw::Callback("early"), Raw::Data(5)],
            to_value,
            |_| Ack::new(|_| Ok(())),
        );
        assert_eq!(args.values(), &[Value::Undefined, Value::Number(5.0)]);
        assert!(!args.has_ack());
    }

    #[test]
    fn test_demux_builds_reverse_closure() {
        let answered = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&answered);

        let args = demux(
            vec![Raw::Data(7), Raw::Callback("cb")],
            to_value,
            move |handle| {
                Ack::new(move |response| {
                    *sink.borrow_mut() = Some((handle, response));
                    Ok(())
                })
            },
        );

        assert_eq!(args.values(), &[Value::Number(7.0)]);
        let ack = args.into_ack().expect("ack should be split off");
        ack.send(vec![Value::from("ok")]).unwrap();

        assert_eq!(
            *answered.borrow(),
            Some(("cb", vec![Value::String("ok".into())]))
        );
    }
}
