//! Exception state and traceback tests

use crate::runtime::object::{ObjKind, ObjectVm};
use crate::runtime::GuestRuntime;

fn format_pending(vm: &ObjectVm) -> Vec<String> {
    let mut exc = vm.take_exception().expect("exception should be pending");
    vm.normalize_exception(&mut exc).unwrap();
    let traceback = vm.traceback_formatter().unwrap();
    let formatted = match &exc.traceback {
        Some(tb) => {
            let f = vm.get_attr(&traceback, "format_exception").unwrap();
            vm.call(&f, vec![exc.kind.clone(), exc.value.clone(), tb.clone()])
                .unwrap()
        }
        None => {
            let f = vm.get_attr(&traceback, "format_exception_only").unwrap();
            vm.call(&f, vec![exc.kind.clone(), exc.value.clone()]).unwrap()
        }
    };
    vm.sequence_items(&formatted)
        .unwrap()
        .unwrap()
        .iter()
        .map(|o| o.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_uncaught_error_leaves_pending_exception() {
    let vm = ObjectVm::new();
    assert!(vm.run_script("x = 1 / 0").is_err());
    assert!(vm.has_exception());
    let lines = format_pending(&vm);
    assert_eq!(
        lines,
        vec![
            "Traceback (most recent call last):\n".to_string(),
            "  File \"<string>\", line 1, in <module>\n".to_string(),
            "ZeroDivisionError: division by zero\n".to_string(),
        ]
    );
    assert!(!vm.has_exception());
}

#[test]
fn test_traceback_lists_nested_frames_oldest_first() {
    let vm = ObjectVm::new();
    let src = "def inner():\n    raise ValueError('bad')\ndef outer():\n    return inner()\nouter()";
    assert!(vm.run_script(src).is_err());
    let lines = format_pending(&vm);
    assert_eq!(lines.len(), 5);
    assert!(lines[1].contains("line 5, in <module>"));
    assert!(lines[2].contains("line 4, in outer"));
    assert!(lines[3].contains("line 2, in inner"));
    assert_eq!(lines[4], "ValueError: bad\n");
}

#[test]
fn test_attribute_error_without_frames_has_no_traceback() {
    let vm = ObjectVm::new();
    assert!(vm.get_attr(&vm.main_module(), "missing").is_err());
    let exc = vm.pending().unwrap();
    assert!(exc.traceback.is_none());
    let lines = format_pending(&vm);
    assert_eq!(
        lines,
        vec!["AttributeError: module '__main__' has no attribute 'missing'\n".to_string()]
    );
}

#[test]
fn test_normalize_wraps_message_in_instance() {
    let vm = ObjectVm::new();
    let _ = vm.raise("KeyError", "k");
    let mut exc = vm.take_exception().unwrap();
    assert!(matches!(exc.value.kind(), ObjKind::Str(_)));
    vm.normalize_exception(&mut exc).unwrap();
    assert!(matches!(exc.value.kind(), ObjKind::Exception(e) if e.class == "KeyError"));
}

#[test]
fn test_syntax_error_is_raised() {
    let vm = ObjectVm::new();
    assert!(vm.run_script("x = (").is_err());
    let lines = format_pending(&vm);
    assert_eq!(lines, vec!["SyntaxError: invalid syntax (line 1)\n".to_string()]);
}

#[test]
fn test_recursion_is_bounded() {
    let vm = ObjectVm::with_recursion_limit(20);
    assert!(vm.run_script("def f():\n    return f()\nf()").is_err());
    let lines = format_pending(&vm);
    assert_eq!(
        lines.last().unwrap(),
        "RecursionError: maximum recursion depth exceeded\n"
    );
}

#[test]
fn test_calling_non_callable() {
    let vm = ObjectVm::new();
    assert!(vm.run_script("x = 5\nx()").is_err());
    let lines = format_pending(&vm);
    assert_eq!(lines.last().unwrap(), "TypeError: 'int' object is not callable\n");
}

#[test]
fn test_clear_exception() {
    let vm = ObjectVm::new();
    let _ = vm.raise("ValueError", "x");
    assert!(vm.has_exception());
    vm.clear_exception();
    assert!(!vm.has_exception());
    assert!(vm.run_script("y = 1").is_ok());
}

#[test]
fn test_huge_repetition_raises() {
    let vm = ObjectVm::new();
    assert!(vm.run_script("s = 'ab' * 9223372036854775807").is_err());
    let last = format_pending(&vm).pop().unwrap();
    assert_eq!(last, "OverflowError: repeated sequence is too long\n");

    assert!(vm.run_script("l = [1, 2] * 1000000000").is_err());
    let last = format_pending(&vm).pop().unwrap();
    assert!(last.starts_with("MemoryError: "), "{}", last);

    vm.run_script("e = 'ab' * -3\nr = 'ab' * 3").unwrap();
    let r = vm.get_attribute(&vm.main_module(), "r").unwrap();
    assert_eq!(r.as_str(), Some("ababab"));
}
