//! Property-based tests for error bounds and protocol invariants.
//!
//! Uses proptest to generate random inputs and verify invariants hold.

use std::sync::Mutex;

use proptest::prelude::*;
use recoil::{defer, try_region, ErrorCode, ErrorValue, Handle, FILE_MAX, MESSAGE_MAX};

/// Strategy for text of arbitrary chars (including NUL and multibyte), up to
/// several times the message bound in bytes.
fn arbitrary_text(max_chars: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..max_chars).prop_map(String::from_iter)
}

proptest! {
    /// Message and file fields stay bounded and null-free for any input.
    #[test]
    fn error_fields_bounded_and_null_free(
        message in arbitrary_text(1600),
        file in arbitrary_text(200),
        line in any::<u32>(),
    ) {
        let err = ErrorValue::with_location(ErrorCode::Parse, &message, &file, line);

        prop_assert!(err.message().len() <= MESSAGE_MAX);
        prop_assert!(!err.message().contains('\0'));
        prop_assert!(message.starts_with(err.message()));

        prop_assert!(err.file().len() <= FILE_MAX);
        prop_assert!(!err.file().contains('\0'));
        prop_assert!(!err.file().contains('/'));
        prop_assert!(!err.file().contains('\\'));
        prop_assert_eq!(err.line(), line);
    }

    /// Short clean messages are stored verbatim.
    #[test]
    fn short_messages_survive_intact(message in "[a-zA-Z0-9 ]{0,200}") {
        let err = ErrorValue::with_location(ErrorCode::Invalid, &message, "f.rs", 1);
        prop_assert_eq!(err.message(), message.as_str());
    }

    /// A throw from the bottom of any nesting depth is caught by the
    /// innermost region, and every outer region completes normally.
    #[test]
    fn innermost_region_catches(depth in 1usize..16) {
        fn descend(levels: usize) -> bool {
            if levels == 0 {
                let caught: Result<(), _> = try_region(|| {
                    recoil::throw!(ErrorCode::File, "bottom");
                });
                return caught.is_err();
            }
            try_region(|| descend(levels - 1)).unwrap_or(false)
        }
        prop_assert!(descend(depth));
    }

    /// Guards release in exact reverse registration order for any count.
    #[test]
    fn release_order_is_reversed(count in 0usize..40) {
        static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());
        unsafe fn record(handle: Handle) {
            ORDER.lock().unwrap().push(handle.as_raw());
        }

        ORDER.lock().unwrap().clear();
        let outcome: Result<(), _> = try_region(|| unsafe {
            for resource in 1..=count {
                defer(record, Handle::from_raw(resource));
            }
            recoil::throw!(ErrorCode::Invalid, "unwind");
        });
        prop_assert!(outcome.is_err());

        let expected: Vec<usize> = (1..=count).rev().collect();
        prop_assert_eq!(&*ORDER.lock().unwrap(), &expected);
    }
}
