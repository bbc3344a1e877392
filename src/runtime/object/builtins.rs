//! Builtin namespace of the object runtime

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use super::value::{ExceptionClass, ExceptionObj, FrameInfo, Obj, ObjKind};
use super::vm::{ModuleSource, ObjectVm};
use crate::runtime::GuestResult;

/// Exception classes and their bases
const EXCEPTION_CLASSES: &[(&str, Option<&str>)] = &[
    ("BaseException", None),
    ("Exception", Some("BaseException")),
    ("ArithmeticError", Some("Exception")),
    ("ZeroDivisionError", Some("ArithmeticError")),
    ("OverflowError", Some("ArithmeticError")),
    ("AttributeError", Some("Exception")),
    ("ImportError", Some("Exception")),
    ("ModuleNotFoundError", Some("ImportError")),
    ("LookupError", Some("Exception")),
    ("MemoryError", Some("Exception")),
    ("IndexError", Some("LookupError")),
    ("KeyError", Some("LookupError")),
    ("NameError", Some("Exception")),
    ("RuntimeError", Some("Exception")),
    ("RecursionError", Some("RuntimeError")),
    ("NotImplementedError", Some("RuntimeError")),
    ("SyntaxError", Some("Exception")),
    ("SystemError", Some("Exception")),
    ("TypeError", Some("Exception")),
    ("ValueError", Some("Exception")),
];

/// Create an exception class object
pub fn exception_class(
    name: &str,
    base: Option<&str>,
) -> Obj {
    Obj::new(ObjKind::Class(ExceptionClass {
        name: name.to_string(),
        base: base.map(str::to_string),
    }))
}

/// Instantiate an exception class with constructor arguments
pub fn instantiate_exception(
    class: &Obj,
    args: Vec<Obj>,
) -> Obj {
    let class = match class.kind() {
        ObjKind::Class(c) => c.name.clone(),
        _ => "Exception".to_string(),
    };
    Obj::new(ObjKind::Exception(ExceptionObj { class, args }))
}

fn arity(
    vm: &ObjectVm,
    name: &str,
    args: &[Obj],
    expected: usize,
) -> GuestResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(vm.raise(
            "TypeError",
            format!(
                "{}() takes exactly {} argument{} ({} given)",
                name,
                expected,
                if expected == 1 { "" } else { "s" },
                args.len()
            ),
        ))
    }
}

/// Populate the builtin namespace and register the `traceback` module
pub fn install(vm: &ObjectVm) {
    for (name, base) in EXCEPTION_CLASSES {
        vm.define_builtin(name, exception_class(name, *base));
    }

    vm.define_builtin(
        "print",
        Obj::native("print", |vm, args| {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(vm.str_of(arg)?);
            }
            vm.write_output(&parts.join(" "));
            vm.write_output("\n");
            Ok(Obj::none())
        }),
    );

    vm.define_builtin(
        "len",
        Obj::native("len", |vm, args| {
            arity(vm, "len", args, 1)?;
            let n = match args[0].kind() {
                ObjKind::Str(s) => s.chars().count(),
                ObjKind::Bytes(b) => b.len(),
                ObjKind::List(items) => items.borrow().len(),
                ObjKind::Tuple(items) => items.len(),
                ObjKind::Dict(map) => map.borrow().len(),
                ObjKind::Instance(i) => match (&i.mapping, &i.sequence) {
                    (Some(pairs), _) => pairs.len(),
                    (None, Some(items)) => items.len(),
                    (None, None) => {
                        return Err(vm.raise(
                            "TypeError",
                            format!("object of type '{}' has no len()", i.class),
                        ))
                    }
                },
                _ => {
                    return Err(vm.raise(
                        "TypeError",
                        format!("object of type '{}' has no len()", args[0].type_name()),
                    ))
                }
            };
            Ok(Obj::int(n))
        }),
    );

    vm.define_builtin(
        "str",
        Obj::native("str", |vm, args| {
            arity(vm, "str", args, 1)?;
            Ok(Obj::str(vm.str_of(&args[0])?))
        }),
    );

    vm.define_builtin(
        "repr",
        Obj::native("repr", |vm, args| {
            arity(vm, "repr", args, 1)?;
            Ok(Obj::str(args[0].repr()))
        }),
    );

    vm.define_builtin(
        "int",
        Obj::native("int", |vm, args| {
            arity(vm, "int", args, 1)?;
            match args[0].kind() {
                ObjKind::Int(i) => Ok(Obj::int(i.clone())),
                ObjKind::Bool(b) => Ok(Obj::int(u8::from(*b))),
                ObjKind::Float(f) => match BigInt::from_f64(*f) {
                    Some(i) => Ok(Obj::int(i)),
                    None => Err(vm.raise(
                        "ValueError",
                        format!("cannot convert float {} to integer", args[0].repr()),
                    )),
                },
                ObjKind::Str(s) => s.trim().parse::<BigInt>().map(Obj::int).map_err(|_| {
                    vm.raise(
                        "ValueError",
                        format!("invalid literal for int() with base 10: {}", args[0].repr()),
                    )
                }),
                _ => Err(vm.raise(
                    "TypeError",
                    format!(
                        "int() argument must be a string or a number, not '{}'",
                        args[0].type_name()
                    ),
                )),
            }
        }),
    );

    vm.define_builtin(
        "float",
        Obj::native("float", |vm, args| {
            arity(vm, "float", args, 1)?;
            match args[0].kind() {
                ObjKind::Float(f) => Ok(Obj::float(*f)),
                ObjKind::Int(i) => Ok(Obj::float(i.to_f64().unwrap_or(f64::INFINITY))),
                ObjKind::Bool(b) => Ok(Obj::float(f64::from(u8::from(*b)))),
                ObjKind::Str(s) => s.trim().parse::<f64>().map(Obj::float).map_err(|_| {
                    vm.raise(
                        "ValueError",
                        format!("could not convert string to float: {}", args[0].repr()),
                    )
                }),
                _ => Err(vm.raise(
                    "TypeError",
                    format!(
                        "float() argument must be a string or a number, not '{}'",
                        args[0].type_name()
                    ),
                )),
            }
        }),
    );

    vm.define_builtin(
        "complex",
        Obj::native("complex", |vm, args| {
            arity(vm, "complex", args, 2)?;
            let part = |o: &Obj| match o.kind() {
                ObjKind::Float(f) => Some(*f),
                ObjKind::Int(i) => i.to_f64(),
                _ => None,
            };
            match (part(&args[0]), part(&args[1])) {
                (Some(re), Some(im)) => Ok(Obj::complex(re, im)),
                _ => Err(vm.raise("TypeError", "complex() arguments must be numbers")),
            }
        }),
    );

    vm.define_builtin(
        "bytes",
        Obj::native("bytes", |vm, args| {
            arity(vm, "bytes", args, 1)?;
            match args[0].kind() {
                ObjKind::Str(s) => Ok(Obj::bytes(s.as_bytes().to_vec())),
                ObjKind::Bytes(b) => Ok(Obj::bytes(b.clone())),
                _ => {
                    let items = vm.iterate(&args[0])?;
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        match item.kind() {
                            ObjKind::Int(i) => match i.to_u8() {
                                Some(b) => out.push(b),
                                None => {
                                    return Err(vm.raise(
                                        "ValueError",
                                        "bytes must be in range(0, 256)",
                                    ))
                                }
                            },
                            _ => {
                                return Err(vm.raise(
                                    "TypeError",
                                    format!(
                                        "'{}' object cannot be interpreted as an integer",
                                        item.type_name()
                                    ),
                                ))
                            }
                        }
                    }
                    Ok(Obj::bytes(out))
                }
            }
        }),
    );

    vm.define_builtin(
        "list",
        Obj::native("list", |vm, args| {
            arity(vm, "list", args, 1)?;
            Ok(Obj::list(vm.iterate(&args[0])?))
        }),
    );

    vm.define_builtin(
        "tuple",
        Obj::native("tuple", |vm, args| {
            arity(vm, "tuple", args, 1)?;
            Ok(Obj::tuple(vm.iterate(&args[0])?))
        }),
    );

    // A record that is both a mapping of its fields and a sequence of its values
    vm.define_builtin(
        "Row",
        Obj::native("Row", |vm, args| {
            arity(vm, "Row", args, 1)?;
            let pairs: Vec<(Obj, Obj)> = match args[0].kind() {
                ObjKind::Dict(map) => map.borrow().values().cloned().collect(),
                _ => {
                    return Err(vm.raise(
                        "TypeError",
                        format!("Row() expects a dict, not '{}'", args[0].type_name()),
                    ))
                }
            };
            let values = pairs.iter().map(|(_, v)| v.clone()).collect();
            let row = Obj::instance("Row").mapping(pairs.clone()).sequence(values).build();
            if let ObjKind::Instance(inst) = row.kind() {
                let mut attrs = inst.attrs.borrow_mut();
                for (k, v) in pairs {
                    if let Some(name) = k.as_str() {
                        attrs.insert(name.to_string(), v);
                    }
                }
            }
            Ok(row)
        }),
    );

    vm.register_module_source("traceback", ModuleSource::Native(Rc::new(init_traceback)));
}

fn format_frame(frame: &FrameInfo) -> String {
    format!(
        "  File \"{}\", line {}, in {}\n",
        frame.file, frame.line, frame.func
    )
}

fn exception_only_line(
    vm: &ObjectVm,
    kind: &Obj,
    value: &Obj,
) -> GuestResult<String> {
    let name = match kind.kind() {
        ObjKind::Class(c) => c.name.clone(),
        _ => kind.type_name(),
    };
    let text = vm.str_of(value)?;
    Ok(if text.is_empty() {
        format!("{}\n", name)
    } else {
        format!("{}: {}\n", name, text)
    })
}

/// The `traceback` module: `format_exception` and `format_exception_only`
fn init_traceback(
    vm: &ObjectVm,
    module: &Obj,
) -> GuestResult<()> {
    vm.set_attribute(
        module,
        "format_exception",
        Obj::native("format_exception", |vm, args| {
            arity(vm, "format_exception", args, 3)?;
            let mut lines = Vec::new();
            if let ObjKind::Traceback(frames) = args[2].kind() {
                lines.push(Obj::str("Traceback (most recent call last):\n"));
                for frame in frames {
                    lines.push(Obj::str(format_frame(frame)));
                }
            }
            lines.push(Obj::str(exception_only_line(vm, &args[0], &args[1])?));
            Ok(Obj::list(lines))
        }),
    )?;
    vm.set_attribute(
        module,
        "format_exception_only",
        Obj::native("format_exception_only", |vm, args| {
            arity(vm, "format_exception_only", args, 2)?;
            let line = exception_only_line(vm, &args[0], &args[1])?;
            Ok(Obj::list(vec![Obj::str(line)]))
        }),
    )
}
