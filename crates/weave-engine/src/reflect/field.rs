//! Reflected fields

use std::sync::{Arc, Weak};

use weave_sdk::{HostClass, HostError, HostField, HostObject};

use crate::convert::{from_host, to_host_checked};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use crate::value::Value;

/// Accessor for one public host field
pub struct ReflectedField {
    field: HostField,
    declaring: Weak<HostClass>,
    declaring_name: String,
}

impl ReflectedField {
    /// Reflect `field` as declared by `class`
    pub fn new(class: &Arc<HostClass>, field: HostField) -> Self {
        Self {
            field,
            declaring: Arc::downgrade(class),
            declaring_name: class.name().to_string(),
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        self.field.name()
    }

    /// Underlying declaration
    pub fn field(&self) -> &HostField {
        &self.field
    }

    fn declaring(&self) -> RuntimeResult<Arc<HostClass>> {
        self.declaring
            .upgrade()
            .ok_or_else(|| HostError::Unloaded(self.declaring_name.clone()).into())
    }

    fn target(&self, this: &Value) -> RuntimeResult<HostObject> {
        let declaring = self.declaring()?;
        this.host_object()
            .filter(|obj| obj.is_instance_of(&declaring))
            .ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "field {}.{} needs a {} instance, not {}",
                    self.declaring_name,
                    self.name(),
                    declaring.simple_name(),
                    this.type_name()
                ))
            })
    }

    /// Read the field.
    ///
    /// Reading an instance field without a receiver yields the accessor itself.
    pub fn get(self: &Arc<Self>, this: Option<&Value>) -> RuntimeResult<Value> {
        if self.field.is_static() {
            let class = self.declaring()?;
            return Ok(from_host(class.get_static(self.name())?));
        }
        match this {
            None => Ok(Value::Field(Arc::clone(self))),
            Some(v) => {
                let obj = self.target(v)?;
                Ok(from_host(obj.get_field(self.name())?))
            }
        }
    }

    /// Convert `value` to the declared type and store it
    pub fn set(&self, rt: &Runtime, this: Option<&Value>, value: &Value) -> RuntimeResult<()> {
        let converted = to_host_checked(rt, value, self.field.ty())?;
        if self.field.is_static() {
            let class = self.declaring()?;
            class.set_static(self.name(), converted)?;
            return Ok(());
        }
        let Some(v) = this else {
            return Err(RuntimeError::type_error(format!(
                "cannot set instance field {}.{} without an instance",
                self.declaring_name,
                self.name()
            )));
        };
        self.target(v)?.set_field(self.name(), converted)?;
        Ok(())
    }
}

impl std::fmt::Debug for ReflectedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReflectedField({}.{})", self.declaring_name, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use weave_sdk::{HostClassBuilder, HostConstructor, HostType, HostValue};

    fn counter() -> Arc<HostClass> {
        HostClassBuilder::new("demo.Counter")
            .constructor(HostConstructor::new(vec![]))
            .field(HostField::new("count", HostType::Int))
            .field(HostField::new("label", HostType::Str).as_final())
            .field(
                HostField::new("LIMIT", HostType::Long)
                    .as_static()
                    .with_initial(HostValue::Long(10)),
            )
            .build()
            .unwrap()
    }

    fn reflect(class: &Arc<HostClass>, name: &str) -> Arc<ReflectedField> {
        Arc::new(ReflectedField::new(class, class.field(name).unwrap().clone()))
    }

    #[test]
    fn test_instance_get_set() {
        let rt = Runtime::new();
        let class = counter();
        let obj = Value::Host(class.instantiate(&[]).unwrap());
        let count = reflect(&class, "count");
        assert_eq!(count.get(Some(&obj)).unwrap(), Value::Int(0));
        count.set(&rt, Some(&obj), &Value::Int(5)).unwrap();
        assert_eq!(count.get(Some(&obj)).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_no_self_read_returns_accessor() {
        let class = counter();
        let count = reflect(&class, "count");
        let got = count.get(None).unwrap();
        assert!(got.is(&Value::Field(Arc::clone(&count))));
    }

    #[test]
    fn test_no_self_write_fails() {
        let rt = Runtime::new();
        let class = counter();
        let err = reflect(&class, "count").set(&rt, None, &Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_static_field_and_conversion() {
        let rt = Runtime::new();
        let class = counter();
        let limit = reflect(&class, "LIMIT");
        assert_eq!(limit.get(None).unwrap(), Value::Int(10));
        limit.set(&rt, None, &Value::Int(12)).unwrap();
        assert_eq!(class.get_static("LIMIT").unwrap(), HostValue::Long(12));

        let err = limit.set(&rt, None, &Value::str("many")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_final_field_write_is_host_error() {
        let rt = Runtime::new();
        let class = counter();
        let obj = Value::Host(class.instantiate(&[]).unwrap());
        let err = reflect(&class, "label")
            .set(&rt, Some(&obj), &Value::str("x"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForeignInterop);
    }
}
