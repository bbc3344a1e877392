//! Built-in commands of the command runtime

use std::rc::Rc;

use indexmap::IndexMap;

use super::expr;
use super::parser;
use super::value::format_list;
use super::{CmdError, CmdResult, CmdValue, CommandInterp};

pub fn install(interp: &CommandInterp) {
    interp.register_command("set", cmd_set);
    interp.register_command("unset", cmd_unset);
    interp.register_command("puts", cmd_puts);
    interp.register_command("list", |_, words| Ok(CmdValue::List(words[1..].to_vec())));
    interp.register_command("llength", cmd_llength);
    interp.register_command("lindex", cmd_lindex);
    interp.register_command("lappend", cmd_lappend);
    interp.register_command("concat", cmd_concat);
    interp.register_command("join", cmd_join);
    interp.register_command("incr", cmd_incr);
    interp.register_command("expr", cmd_expr);
    interp.register_command("error", cmd_error);
    interp.register_command("catch", cmd_catch);
    interp.register_command("eval", cmd_eval);
    interp.register_command("return", cmd_return);
    interp.register_command("proc", cmd_proc);
    interp.register_command("dict", cmd_dict);
    interp.register_command("info", cmd_info);
    interp.register_command("package", cmd_package);
}

fn arity(
    words: &[CmdValue],
    min: usize,
    max: usize,
    synopsis: &str,
) -> CmdResult<()> {
    if words.len() < min || words.len() > max {
        return Err(CmdError::wrong_args(words, 1, synopsis));
    }
    Ok(())
}

fn cmd_set(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 3, "varName ?newValue?")?;
    let name = words[1].as_string();
    match words.get(2) {
        Some(value) => {
            interp.set_var(&name, value.clone());
            Ok(value.clone())
        }
        None => interp.get_var(&name),
    }
}

fn cmd_unset(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    for name in &words[1..] {
        let name = name.as_string();
        if !interp.unset_var(&name) {
            return Err(CmdError::failed(format!(
                "can't unset \"{}\": no such variable",
                name
            )));
        }
    }
    Ok(CmdValue::Empty)
}

fn cmd_puts(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    match words {
        [_, text] => interp.write_output(&format!("{}\n", text)),
        [_, flag, text] if flag.as_string() == "-nonewline" => interp.write_output(&text.as_string()),
        _ => return Err(CmdError::wrong_args(words, 1, "?-nonewline? string")),
    }
    Ok(CmdValue::Empty)
}

fn cmd_llength(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 2, "list")?;
    Ok(CmdValue::int(words[1].as_list()?.len() as i64))
}

fn cmd_lindex(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 3, "list ?index?")?;
    let Some(index) = words.get(2) else {
        return Ok(words[1].clone());
    };
    let items = words[1].as_list()?;
    let text = index.as_string();
    let position = if text == "end" {
        items.len().checked_sub(1)
    } else {
        let i = index.as_int()?;
        usize::try_from(i).ok()
    };
    Ok(position
        .and_then(|i| items.get(i).cloned())
        .unwrap_or(CmdValue::Empty))
}

fn cmd_lappend(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, usize::MAX, "varName ?value ...?")?;
    let name = words[1].as_string();
    let mut items = match interp.get_var(&name) {
        Ok(current) => current.as_list()?,
        Err(_) => Vec::new(),
    };
    items.extend(words[2..].iter().cloned());
    let list = CmdValue::List(items);
    interp.set_var(&name, list.clone());
    Ok(list)
}

fn cmd_concat(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    let parts: Vec<String> = words[1..]
        .iter()
        .map(|w| w.as_string().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Ok(CmdValue::text(parts.join(" ")))
}

fn cmd_join(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 3, "list ?joinString?")?;
    let separator = words.get(2).map(|w| w.as_string()).unwrap_or_else(|| " ".into());
    let items: Vec<String> = words[1].as_list()?.iter().map(|v| v.as_string()).collect();
    Ok(CmdValue::text(items.join(&separator)))
}

fn cmd_incr(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 3, "varName ?increment?")?;
    let name = words[1].as_string();
    let step = match words.get(2) {
        Some(step) => step.as_int()?,
        None => 1,
    };
    let current = match interp.get_var(&name) {
        Ok(value) => value.as_int()?,
        Err(_) => 0,
    };
    let next = current
        .checked_add(step)
        .ok_or_else(|| CmdError::failed("integer overflow"))?;
    let value = CmdValue::int(next);
    interp.set_var(&name, value.clone());
    Ok(value)
}

fn cmd_expr(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, usize::MAX, "arg ?arg ...?")?;
    let source: Vec<String> = words[1..].iter().map(|w| w.as_string()).collect();
    Ok(CmdValue::int(expr::evaluate(interp, &source.join(" "))?))
}

fn cmd_error(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 2, "message")?;
    Err(CmdError::Failed(words[1].as_string()))
}

fn cmd_catch(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, 3, "script ?resultVarName?")?;
    let result = interp.settle(interp.eval(&words[1].as_string()));
    let (code, value) = match result {
        Ok(value) => (0, value),
        Err(CmdError::Return(value)) => (2, value),
        Err(err) => (1, CmdValue::text(err.to_string())),
    };
    if let Some(var) = words.get(2) {
        interp.set_var(&var.as_string(), value);
    }
    Ok(CmdValue::int(code))
}

fn cmd_eval(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, usize::MAX, "arg ?arg ...?")?;
    let script = if words.len() == 2 {
        words[1].as_string()
    } else {
        let parts: Vec<String> = words[1..].iter().map(|w| w.as_string()).collect();
        parts.join(" ")
    };
    interp.eval(&script)
}

fn cmd_return(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 1, 2, "?value?")?;
    Err(CmdError::Return(
        words.get(1).cloned().unwrap_or(CmdValue::Empty),
    ))
}

fn cmd_proc(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 4, 4, "name args body")?;
    let name = words[1].as_string();
    let params: Vec<String> = words[2].as_list()?.iter().map(|p| p.as_string()).collect();
    let body = Rc::new(parser::parse(&words[3].as_string())?);
    let mut synopsis = vec![name.clone()];
    synopsis.extend(params.iter().cloned());
    let usage = format_list(&synopsis);
    interp.register_command(&name, move |interp, args| {
        if args.len() != params.len() + 1 {
            return Err(CmdError::WrongArgs(usage.clone()));
        }
        let locals: IndexMap<String, CmdValue> = params
            .iter()
            .cloned()
            .zip(args[1..].iter().cloned())
            .collect();
        interp.with_frame(locals, || match interp.eval_commands(&body) {
            Err(CmdError::Return(value)) => Ok(value),
            other => other,
        })
    });
    Ok(CmdValue::Empty)
}

fn cmd_dict(
    _: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 2, usize::MAX, "subcommand ?arg ...?")?;
    match words[1].as_string().as_str() {
        "create" => {
            if words.len() % 2 != 0 {
                return Err(CmdError::wrong_args(words, 2, "?key value ...?"));
            }
            let mut map = IndexMap::new();
            for pair in words[2..].chunks(2) {
                map.insert(pair[0].as_string(), pair[1].clone());
            }
            Ok(CmdValue::Dict(map))
        }
        "get" => {
            if words.len() < 3 {
                return Err(CmdError::wrong_args(words, 2, "dictionary ?key ...?"));
            }
            let mut current = words[2].clone();
            for key in &words[3..] {
                let key = key.as_string();
                let map = current.as_dict()?;
                current = map.get(&key).cloned().ok_or_else(|| {
                    CmdError::failed(format!(
                        "key \"{}\" not known in dictionary",
                        key
                    ))
                })?;
            }
            Ok(current)
        }
        "exists" => {
            if words.len() < 4 {
                return Err(CmdError::wrong_args(words, 2, "dictionary key ?key ...?"));
            }
            let mut current = words[2].clone();
            for key in &words[3..] {
                match current.as_dict().ok().and_then(|m| m.get(&key.as_string()).cloned()) {
                    Some(next) => current = next,
                    None => return Ok(CmdValue::Boolean(false)),
                }
            }
            Ok(CmdValue::Boolean(true))
        }
        "size" => {
            if words.len() != 3 {
                return Err(CmdError::wrong_args(words, 2, "dictionary"));
            }
            Ok(CmdValue::int(words[2].as_dict()?.len() as i64))
        }
        "keys" => {
            if words.len() != 3 {
                return Err(CmdError::wrong_args(words, 2, "dictionary"));
            }
            let keys = words[2].as_dict()?.keys().cloned().map(CmdValue::text).collect();
            Ok(CmdValue::List(keys))
        }
        other => Err(CmdError::failed(format!(
            "unknown or ambiguous subcommand \"{}\": must be create, exists, get, keys, or size",
            other
        ))),
    }
}

fn cmd_info(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    match (words.get(1).map(|w| w.as_string()).as_deref(), words.len()) {
        (Some("exists"), 3) => Ok(CmdValue::Boolean(interp.var_exists(&words[2].as_string()))),
        (Some("commands"), 2) => Ok(CmdValue::List(
            interp.command_names().into_iter().map(CmdValue::text).collect(),
        )),
        (Some("exists"), _) => Err(CmdError::wrong_args(words, 2, "varName")),
        _ => Err(CmdError::failed(
            "bad option: must be commands or exists",
        )),
    }
}

fn cmd_package(
    interp: &CommandInterp,
    words: &[CmdValue],
) -> CmdResult {
    arity(words, 3, 4, "option ?arg ...?")?;
    let name = words[2].as_string();
    match (words[1].as_string().as_str(), words.get(3)) {
        ("provide", Some(version)) => {
            interp.package_provide(&name, &version.as_string());
            Ok(CmdValue::Empty)
        }
        ("provide", None) => Ok(interp
            .package_present(&name)
            .map(CmdValue::text)
            .unwrap_or(CmdValue::Empty)),
        ("require", None) => interp.package_require(&name).map(CmdValue::text),
        ("present", None) => interp
            .package_present(&name)
            .map(CmdValue::text)
            .ok_or_else(|| CmdError::failed(format!("package {} is not present", name))),
        (option, _) => Err(CmdError::failed(format!(
            "bad option \"{}\": must be present, provide, or require",
            option
        ))),
    }
}
