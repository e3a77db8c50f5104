//! Argument binding for native callables
//!
//! Arguments arrive in the runtime's calling convention: positional values
//! first, then keyword values, with `kw_names` naming the trailing keyword
//! values. `ArgParser` maps both onto declared parameter slots.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;

/// Ordinal for a 1-based position: "1st", "2nd", "3rd", then "Nth"
pub fn ordinal(n: usize) -> String {
    match n {
        1 => "1st".to_string(),
        2 => "2nd".to_string(),
        3 => "3rd".to_string(),
        _ => format!("{}th", n),
    }
}

/// Binds supplied arguments to declared parameter names
#[derive(Debug)]
pub struct ArgParser<'a> {
    func: &'a str,
    args: &'a [Value],
    kw_names: &'a [&'a str],
    params: &'a [&'a str],
    positional: usize,
}

impl<'a> ArgParser<'a> {
    /// Validate arity and keyword names.
    ///
    /// Every keyword must name a declared parameter not already supplied
    /// by position.
    pub fn new(
        func: &'a str,
        args: &'a [Value],
        kw_names: &'a [&'a str],
        params: &'a [&'a str],
    ) -> RuntimeResult<Self> {
        if kw_names.len() > args.len() {
            return Err(RuntimeError::invalid_argument(format!(
                "{}(): {} keyword names for {} arguments",
                func,
                kw_names.len(),
                args.len()
            )));
        }
        let positional = args.len() - kw_names.len();
        for kw in kw_names {
            match params.iter().position(|p| p == kw) {
                None => {
                    return Err(RuntimeError::invalid_argument(format!(
                        "{}(): unexpected keyword argument '{}'",
                        func, kw
                    )));
                }
                Some(index) if index < positional => {
                    return Err(RuntimeError::invalid_argument(format!(
                        "{}(): got multiple values for argument '{}'",
                        func, kw
                    )));
                }
                Some(_) => {}
            }
        }
        if positional > params.len() {
            return Err(RuntimeError::invalid_argument(format!(
                "{}() takes at most {} arguments ({} given)",
                func,
                params.len(),
                positional
            )));
        }
        Ok(Self {
            func,
            args,
            kw_names,
            params,
            positional,
        })
    }

    /// Name of the callable being bound
    pub fn func(&self) -> &str {
        self.func
    }

    fn slot(&self, index: usize) -> Option<&'a Value> {
        if index < self.positional {
            return self.args.get(index);
        }
        let name = self.params.get(index)?;
        self.kw_names
            .iter()
            .position(|k| k == name)
            .and_then(|j| self.args.get(self.positional + j))
    }

    /// Whether slot `index` was supplied
    pub fn has(&self, index: usize) -> bool {
        self.slot(index).is_some()
    }

    /// Value of a slot that must be supplied
    pub fn required(&self, index: usize) -> RuntimeResult<&'a Value> {
        self.slot(index).ok_or_else(|| {
            RuntimeError::invalid_argument(format!(
                "{}(): {} argument is required",
                self.func,
                ordinal(index + 1)
            ))
        })
    }

    /// Value of a slot, or `default` when absent
    pub fn optional(&self, index: usize, default: Value) -> Value {
        self.slot(index).cloned().unwrap_or(default)
    }

    /// Required slot as an owned value
    pub fn value(&self, index: usize) -> RuntimeResult<Value> {
        self.required(index).cloned()
    }

    /// Required string slot
    pub fn string(&self, index: usize) -> RuntimeResult<String> {
        let value = self.required(index)?;
        self.as_string(index, value)
    }

    /// String slot, or `default` when absent
    pub fn string_or(&self, index: usize, default: &str) -> RuntimeResult<String> {
        match self.slot(index) {
            Some(value) => self.as_string(index, value),
            None => Ok(default.to_string()),
        }
    }

    /// Required integer slot
    pub fn int(&self, index: usize) -> RuntimeResult<i64> {
        let value = self.required(index)?;
        self.as_int(index, value)
    }

    /// Integer slot, or `default` when absent
    pub fn int_or(&self, index: usize, default: i64) -> RuntimeResult<i64> {
        match self.slot(index) {
            Some(value) => self.as_int(index, value),
            None => Ok(default),
        }
    }

    fn as_string(&self, index: usize, value: &Value) -> RuntimeResult<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_type(index, "str", value))
    }

    fn as_int(&self, index: usize, value: &Value) -> RuntimeResult<i64> {
        value.as_int().ok_or_else(|| self.wrong_type(index, "int", value))
    }

    fn wrong_type(&self, index: usize, expected: &str, got: &Value) -> RuntimeError {
        RuntimeError::invalid_argument(format!(
            "{}(): argument {} must be {}, not {}",
            self.func,
            index + 1,
            expected,
            got.type_name()
        ))
    }
}
