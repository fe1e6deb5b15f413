// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Attribute metadata, constraints, and value storage.

use crate::error::{ModelError, Result};
use crate::value::{SemanticType, Value};

/// Read/write access mode declared on an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

/// A declared constraint on an attribute's numeric value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Inclusive numeric range, compared on the coerced i64/u64 magnitude.
    Range { min: i64, max: i64 },
}

impl Constraint {
    fn check(&self, value: &Value) -> bool {
        match self {
            Constraint::Range { min, max } => match value {
                Value::U8(v) => (*v as i64) >= *min && (*v as i64) <= *max,
                Value::U16(v) => (*v as i64) >= *min && (*v as i64) <= *max,
                Value::U32(v) => (*v as i64) >= *min && (*v as i64) <= *max,
                Value::U64(v) => i64::try_from(*v).map(|v| v >= *min && v <= *max).unwrap_or(false),
                Value::I64(v) => *v >= *min && *v <= *max,
                _ => true,
            },
        }
    }
}

/// Immutable metadata describing one attribute. Construction-time only; the
/// current value lives alongside this in `AttributeSlot`.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub id: u16,
    pub name: &'static str,
    pub ty: SemanticType,
    pub access: Access,
    pub nullable: bool,
    pub unit: Option<&'static str>,
    pub default: Option<Value>,
    pub constraint: Option<Constraint>,
}

impl AttributeDef {
    pub fn new(id: u16, name: &'static str, ty: SemanticType, access: Access) -> Self {
        Self {
            id,
            name,
            ty,
            access,
            nullable: false,
            unit: None,
            default: None,
            constraint: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Validate `value` against type, nullability, and constraint. Does not
    /// check access — callers that need the access check (external writes)
    /// do that separately so that `set_value_internal` can bypass it.
    pub fn validate(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(ModelError::NotNullable(self.id))
            };
        }
        let coerced = value
            .coerce(self.ty)
            .ok_or(ModelError::TypeMismatch(self.id))?;
        if let Some(constraint) = &self.constraint {
            if !constraint.check(&coerced) {
                return Err(ModelError::ConstraintViolated(self.id));
            }
        }
        Ok(coerced)
    }
}

/// An attribute's metadata plus its current value.
#[derive(Debug, Clone)]
pub struct AttributeSlot {
    pub def: AttributeDef,
    value: Value,
}

impl AttributeSlot {
    /// Build a slot, validating the initial value (which must be the
    /// default if one was declared, or `Value::Null` for nullable
    /// attributes with no default).
    pub fn new(def: AttributeDef, initial: Value) -> Result<Self> {
        let value = def.validate(&initial)?;
        Ok(Self { def, value })
    }

    pub fn from_default(def: AttributeDef) -> Result<Self> {
        let initial = def.default.clone().unwrap_or(Value::Null);
        Self::new(def, initial)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Validate-and-set without an access check, for firmware-driven
    /// updates (§4.1 `set_value_internal`).
    pub fn set_value_internal(&mut self, value: Value) -> Result<Value> {
        let coerced = self.def.validate(&value)?;
        self.value = coerced.clone();
        Ok(coerced)
    }

    /// Validate-and-set enforcing write access, for external writes.
    pub fn write_value(&mut self, value: Value) -> Result<Value> {
        if !self.def.access.writable() {
            return Err(ModelError::ReadOnly(self.def.id));
        }
        self.set_value_internal(value)
    }

    pub fn read_value(&self) -> Result<&Value> {
        if !self.def.access.readable() {
            return Err(ModelError::WriteOnly(self.def.id));
        }
        Ok(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_rejects_write() {
        let def = AttributeDef::new(1, "x", SemanticType::U16, Access::ReadOnly);
        let mut slot = AttributeSlot::new(def, Value::U16(0)).unwrap();
        assert_eq!(slot.write_value(Value::U16(5)), Err(ModelError::ReadOnly(1)));
        assert_eq!(slot.read_value().unwrap(), &Value::U16(0));
    }

    #[test]
    fn constraint_rejects_out_of_range() {
        let def = AttributeDef::new(1, "x", SemanticType::U32, Access::ReadWrite)
            .with_constraint(Constraint::Range { min: 0, max: 1000 });
        let mut slot = AttributeSlot::new(def, Value::U32(0)).unwrap();
        assert!(slot.write_value(Value::U32(2000)).is_err());
        assert_eq!(slot.read_value().unwrap(), &Value::U32(0));
    }

    #[test]
    fn not_nullable_rejects_null() {
        let def = AttributeDef::new(1, "x", SemanticType::U32, Access::ReadWrite);
        let mut slot = AttributeSlot::new(def, Value::U32(0)).unwrap();
        assert_eq!(slot.write_value(Value::Null), Err(ModelError::NotNullable(1)));
    }

    #[test]
    fn read_after_write() {
        let def = AttributeDef::new(1, "x", SemanticType::U32, Access::ReadWrite);
        let mut slot = AttributeSlot::new(def, Value::U32(0)).unwrap();
        let confirmed = slot.write_value(Value::U32(42)).unwrap();
        assert_eq!(confirmed, Value::U32(42));
        assert_eq!(slot.read_value().unwrap(), &Value::U32(42));
    }
}
