use crate::schema::{Descriptor, DescriptorParser, FieldType, Label};
use std::fmt;
use std::sync::Arc;

/// An enum payload carries its value count so that consumers can stay
/// within the valid index range without a registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    pub index: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Enum(EnumValue),
    /// String payloads are raw bytes; mutation may produce non-UTF-8 data.
    Str(Vec<u8>),
    Bytes(Vec<u8>),
    Message(Message),
}

impl Value {
    pub fn kind_matches(&self, field_type: &FieldType) -> bool {
        match (self, field_type) {
            (Value::Int32(_), FieldType::Int32) => true,
            (Value::Int64(_), FieldType::Int64) => true,
            (Value::UInt32(_), FieldType::UInt32) => true,
            (Value::UInt64(_), FieldType::UInt64) => true,
            (Value::Float(_), FieldType::Float) => true,
            (Value::Double(_), FieldType::Double) => true,
            (Value::Bool(_), FieldType::Bool) => true,
            (Value::Enum(_), FieldType::Enum(_)) => true,
            (Value::Str(_), FieldType::Str) => true,
            (Value::Bytes(_), FieldType::Bytes) => true,
            (Value::Message(m), FieldType::Message(name)) => m.descriptor().name == *name,
            _ => false,
        }
    }
}

/// The schema default for a field type: zero numerics, `false`, the first
/// enum value, empty buffers, an empty sub-message.
pub fn default_value(
    field_type: &FieldType,
    registry: &DescriptorParser,
) -> Result<Value, String> {
    Ok(match field_type {
        FieldType::Int32 => Value::Int32(0),
        FieldType::Int64 => Value::Int64(0),
        FieldType::UInt32 => Value::UInt32(0),
        FieldType::UInt64 => Value::UInt64(0),
        FieldType::Float => Value::Float(0.0),
        FieldType::Double => Value::Double(0.0),
        FieldType::Bool => Value::Bool(false),
        FieldType::Str => Value::Str(Vec::new()),
        FieldType::Bytes => Value::Bytes(Vec::new()),
        FieldType::Enum(name) => {
            let descriptor = registry
                .get_enum(name)
                .ok_or_else(|| format!("unknown enum type: {}", name))?;
            Value::Enum(EnumValue {
                index: 0,
                count: descriptor.values.len(),
            })
        }
        FieldType::Message(name) => {
            let descriptor = registry
                .get_descriptor(name)
                .ok_or_else(|| format!("unknown message type: {}", name))?;
            Value::Message(Message::new(descriptor))
        }
    })
}

/// One step of a field path: a field index in the enclosing message, plus
/// an element index for repeated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub field: usize,
    pub index: Option<usize>,
}

/// Addresses one concrete field slot inside a message tree. All interior
/// steps traverse sub-message values; the final step names the target
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    pub steps: Vec<PathStep>,
}

impl FieldPath {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match step.index {
                Some(index) => write!(f, "{}[{}]", step.field, index)?,
                None => write!(f, "{}", step.field)?,
            }
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Unset,
    Single(Value),
    Repeated(Vec<Value>),
}

/// A value tree conforming to a descriptor. Field storage is positional,
/// parallel to the descriptor's field list, which gives a stable field
/// enumeration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    descriptor: Arc<Descriptor>,
    slots: Vec<Slot>,
}

impl Message {
    pub fn new(descriptor: Arc<Descriptor>) -> Self {
        let slots = descriptor
            .fields
            .iter()
            .map(|field| match field.label {
                Label::Repeated => Slot::Repeated(Vec::new()),
                _ => Slot::Unset,
            })
            .collect();
        Self { descriptor, slots }
    }

    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    pub fn field_count(&self) -> usize {
        self.descriptor.fields.len()
    }

    /// Presence of a singular field. Always false for repeated fields.
    pub fn has(&self, field: usize) -> bool {
        matches!(self.slots.get(field), Some(Slot::Single(_)))
    }

    /// Element count of a repeated field. Zero for singular fields.
    pub fn len(&self, field: usize) -> usize {
        match self.slots.get(field) {
            Some(Slot::Repeated(values)) => values.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self, field: usize) -> bool {
        self.len(field) == 0
    }

    pub fn get(&self, field: usize, index: Option<usize>) -> Option<&Value> {
        match (self.slots.get(field)?, index) {
            (Slot::Single(value), None) => Some(value),
            (Slot::Repeated(values), Some(i)) => values.get(i),
            _ => None,
        }
    }

    fn get_mut(&mut self, field: usize, index: Option<usize>) -> Option<&mut Value> {
        match (self.slots.get_mut(field)?, index) {
            (Slot::Single(value), None) => Some(value),
            (Slot::Repeated(values), Some(i)) => values.get_mut(i),
            _ => None,
        }
    }

    fn check_write(&self, field: usize, value: &Value) -> Result<(), String> {
        let descriptor = self
            .descriptor
            .fields
            .get(field)
            .ok_or_else(|| format!("field index {} out of range", field))?;
        if !value.kind_matches(&descriptor.field_type) {
            return Err(format!(
                "type mismatch writing field '{}' of '{}'",
                descriptor.name, self.descriptor.name
            ));
        }
        Ok(())
    }

    fn clear_oneof_siblings(&mut self, field: usize) {
        let descriptor = Arc::clone(&self.descriptor);
        if let Some(group) = descriptor.fields[field].oneof {
            for &member in &descriptor.oneofs[group].fields {
                if member != field {
                    self.slots[member] = Slot::Unset;
                }
            }
        }
    }

    /// Overwrites an existing slot. For a singular field this establishes
    /// presence; choice-group members clear their siblings.
    pub fn set(&mut self, field: usize, index: Option<usize>, value: Value) -> Result<(), String> {
        self.check_write(field, &value)?;
        if self.descriptor.fields[field].is_repeated() {
            let i = index.ok_or_else(|| "missing index for repeated field".to_string())?;
            match &mut self.slots[field] {
                Slot::Repeated(values) if i < values.len() => {
                    values[i] = value;
                    Ok(())
                }
                _ => Err(format!("repeated index {} out of bounds", i)),
            }
        } else {
            self.clear_oneof_siblings(field);
            self.slots[field] = Slot::Single(value);
            Ok(())
        }
    }

    /// Inserts into a repeated field at `index <= len`, shifting the tail;
    /// for singular fields this behaves as `set`.
    pub fn insert(
        &mut self,
        field: usize,
        index: Option<usize>,
        value: Value,
    ) -> Result<(), String> {
        self.check_write(field, &value)?;
        if self.descriptor.fields[field].is_repeated() {
            let i = index.ok_or_else(|| "missing index for repeated field".to_string())?;
            match &mut self.slots[field] {
                Slot::Repeated(values) if i <= values.len() => {
                    values.insert(i, value);
                    Ok(())
                }
                _ => Err(format!("repeated insertion index {} out of bounds", i)),
            }
        } else {
            self.clear_oneof_siblings(field);
            self.slots[field] = Slot::Single(value);
            Ok(())
        }
    }

    pub fn push(&mut self, field: usize, value: Value) -> Result<(), String> {
        let end = self.len(field);
        self.insert(field, Some(end), value)
    }

    /// Removes a repeated element at `index < len`; for singular fields
    /// this clears presence.
    pub fn remove(&mut self, field: usize, index: Option<usize>) -> Result<(), String> {
        if field >= self.slots.len() {
            return Err(format!("field index {} out of range", field));
        }
        if self.descriptor.fields[field].is_repeated() {
            let i = index.ok_or_else(|| "missing index for repeated field".to_string())?;
            match &mut self.slots[field] {
                Slot::Repeated(values) if i < values.len() => {
                    values.remove(i);
                    Ok(())
                }
                _ => Err(format!("repeated index {} out of bounds", i)),
            }
        } else {
            self.slots[field] = Slot::Unset;
            Ok(())
        }
    }

    pub fn swap(&mut self, field: usize, a: usize, b: usize) -> Result<(), String> {
        match self.slots.get_mut(field) {
            Some(Slot::Repeated(values)) if a < values.len() && b < values.len() => {
                values.swap(a, b);
                Ok(())
            }
            _ => Err(format!("cannot swap elements {} and {}", a, b)),
        }
    }

    pub fn truncate(&mut self, field: usize, len: usize) -> Result<(), String> {
        match self.slots.get_mut(field) {
            Some(Slot::Repeated(values)) => {
                values.truncate(len);
                Ok(())
            }
            _ => Err("truncate requires a repeated field".to_string()),
        }
    }

    /// Two mutable references into a repeated field, `a < b`.
    pub fn repeated_pair_mut(
        &mut self,
        field: usize,
        a: usize,
        b: usize,
    ) -> Option<(&mut Value, &mut Value)> {
        match self.slots.get_mut(field)? {
            Slot::Repeated(values) if a < b && b < values.len() => {
                let (left, right) = values.split_at_mut(b);
                Some((&mut left[a], &mut right[0]))
            }
            _ => None,
        }
    }

    /// The currently set member of a choice group, if any.
    pub fn oneof_field(&self, group: usize) -> Option<usize> {
        self.descriptor
            .oneofs
            .get(group)?
            .fields
            .iter()
            .copied()
            .find(|&member| self.has(member))
    }

    pub fn nested(&self, field: usize, index: Option<usize>) -> Option<&Message> {
        match self.get(field, index)? {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn nested_mut(&mut self, field: usize, index: Option<usize>) -> Option<&mut Message> {
        match self.get_mut(field, index)? {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Follows interior path steps down to the enclosing message.
    pub fn descend(&self, steps: &[PathStep]) -> Option<&Message> {
        let mut current = self;
        for step in steps {
            current = current.nested(step.field, step.index)?;
        }
        Some(current)
    }

    pub fn descend_mut(&mut self, steps: &[PathStep]) -> Option<&mut Message> {
        let mut current = self;
        for step in steps {
            current = current.nested_mut(step.field, step.index)?;
        }
        Some(current)
    }

    /// False iff any transitive required field is unset.
    pub fn is_initialized(&self) -> bool {
        for (i, field) in self.descriptor.fields.iter().enumerate() {
            if field.is_required() && !self.has(i) {
                return false;
            }
            match &self.slots[i] {
                Slot::Single(Value::Message(message)) => {
                    if !message.is_initialized() {
                        return false;
                    }
                }
                Slot::Repeated(values) => {
                    for value in values {
                        if let Value::Message(message) = value {
                            if !message.is_initialized() {
                                return false;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        true
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Enum(e) => write!(f, "{}", e.index),
            Value::Str(bytes) => {
                write!(f, "\"{}\"", String::from_utf8_lossy(bytes).escape_debug())
            }
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Message(message) => write!(f, "{}", message),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.descriptor.name)?;
        let mut first = true;
        for (i, field) in self.descriptor.fields.iter().enumerate() {
            match &self.slots[i] {
                Slot::Unset => continue,
                Slot::Single(value) => {
                    write!(f, "{} {}: {}", if first { "" } else { "," }, field.name, value)?;
                    first = false;
                }
                Slot::Repeated(values) => {
                    if values.is_empty() {
                        continue;
                    }
                    write!(f, "{} {}: [", if first { "" } else { "," }, field.name)?;
                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", value)?;
                    }
                    write!(f, "]")?;
                    first = false;
                }
            }
        }
        if first {
            write!(f, "}}")
        } else {
            write!(f, " }}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(content: &str) -> DescriptorParser {
        let mut parser = DescriptorParser::new();
        parser.parse_file(content).unwrap();
        parser
    }

    #[test]
    fn test_singular_presence() -> Result<(), String> {
        let parser = registry("M { required int32 a, optional string b }");
        let mut message = Message::new(parser.get_descriptor("M").unwrap());

        assert!(!message.has(0));
        message.set(0, None, Value::Int32(7))?;
        assert!(message.has(0));
        assert_eq!(message.get(0, None), Some(&Value::Int32(7)));

        message.remove(0, None)?;
        assert!(!message.has(0));
        Ok(())
    }

    #[test]
    fn test_type_checked_writes() {
        let parser = registry("M { required int32 a }");
        let mut message = Message::new(parser.get_descriptor("M").unwrap());
        assert!(message.set(0, None, Value::Bool(true)).is_err());
        assert!(message.set(0, None, Value::Int32(1)).is_ok());
    }

    #[test]
    fn test_repeated_operations() -> Result<(), String> {
        let parser = registry("M { repeated int32 xs }");
        let mut message = Message::new(parser.get_descriptor("M").unwrap());

        message.insert(0, Some(0), Value::Int32(1))?;
        message.insert(0, Some(1), Value::Int32(3))?;
        message.insert(0, Some(1), Value::Int32(2))?;
        assert_eq!(message.len(0), 3);
        assert_eq!(message.get(0, Some(0)), Some(&Value::Int32(1)));
        assert_eq!(message.get(0, Some(1)), Some(&Value::Int32(2)));
        assert_eq!(message.get(0, Some(2)), Some(&Value::Int32(3)));

        assert!(message.insert(0, Some(5), Value::Int32(9)).is_err());

        message.swap(0, 0, 2)?;
        assert_eq!(message.get(0, Some(0)), Some(&Value::Int32(3)));

        message.set(0, Some(1), Value::Int32(20))?;
        assert_eq!(message.get(0, Some(1)), Some(&Value::Int32(20)));

        message.remove(0, Some(0))?;
        assert_eq!(message.len(0), 2);

        message.truncate(0, 1)?;
        assert_eq!(message.len(0), 1);
        Ok(())
    }

    #[test]
    fn test_oneof_exclusivity() -> Result<(), String> {
        let parser = registry("M { oneof kind { int32 number, string text } }");
        let mut message = Message::new(parser.get_descriptor("M").unwrap());

        assert_eq!(message.oneof_field(0), None);
        message.set(0, None, Value::Int32(1))?;
        assert_eq!(message.oneof_field(0), Some(0));

        message.set(1, None, Value::Str(b"hi".to_vec()))?;
        assert_eq!(message.oneof_field(0), Some(1));
        assert!(!message.has(0));
        Ok(())
    }

    #[test]
    fn test_is_initialized_transitive() -> Result<(), String> {
        let parser = registry(
            "Inner { required int32 x }
             Outer { optional Inner child, repeated Inner items }",
        );
        let mut outer = Message::new(parser.get_descriptor("Outer").unwrap());
        assert!(outer.is_initialized());

        let inner = Message::new(parser.get_descriptor("Inner").unwrap());
        outer.set(0, None, Value::Message(inner))?;
        assert!(!outer.is_initialized());

        outer
            .nested_mut(0, None)
            .unwrap()
            .set(0, None, Value::Int32(1))?;
        assert!(outer.is_initialized());

        let inner = Message::new(parser.get_descriptor("Inner").unwrap());
        outer.push(1, Value::Message(inner))?;
        assert!(!outer.is_initialized());
        Ok(())
    }

    #[test]
    fn test_default_values() -> Result<(), String> {
        let parser = registry(
            "enum Color { RED, GREEN, BLUE }
             M { optional Color color, optional Point at }
             Point { required int32 x }",
        );

        let color = default_value(&FieldType::Enum("Color".to_string()), &parser)?;
        assert_eq!(color, Value::Enum(EnumValue { index: 0, count: 3 }));

        let point = default_value(&FieldType::Message("Point".to_string()), &parser)?;
        match point {
            Value::Message(message) => {
                assert_eq!(message.descriptor().name, "Point");
                assert!(!message.has(0));
            }
            other => return Err(format!("expected message, got {:?}", other)),
        }

        assert_eq!(default_value(&FieldType::Str, &parser)?, Value::Str(Vec::new()));
        assert_eq!(default_value(&FieldType::Double, &parser)?, Value::Double(0.0));
        Ok(())
    }

    #[test]
    fn test_descend_paths() -> Result<(), String> {
        let parser = registry(
            "Inner { required int32 x }
             Outer { repeated Inner items }",
        );
        let mut outer = Message::new(parser.get_descriptor("Outer").unwrap());
        let mut inner = Message::new(parser.get_descriptor("Inner").unwrap());
        inner.set(0, None, Value::Int32(42))?;
        outer.push(0, Value::Message(inner))?;

        let steps = [PathStep {
            field: 0,
            index: Some(0),
        }];
        let child = outer.descend(&steps).unwrap();
        assert_eq!(child.get(0, None), Some(&Value::Int32(42)));

        let child = outer.descend_mut(&steps).unwrap();
        child.set(0, None, Value::Int32(43))?;
        assert_eq!(
            outer.descend(&steps).unwrap().get(0, None),
            Some(&Value::Int32(43))
        );

        let missing = [PathStep {
            field: 0,
            index: Some(9),
        }];
        assert!(outer.descend(&missing).is_none());
        Ok(())
    }

    #[test]
    fn test_repeated_pair_mut() -> Result<(), String> {
        let parser = registry("M { repeated int32 xs }");
        let mut message = Message::new(parser.get_descriptor("M").unwrap());
        for v in [1, 2, 3] {
            message.push(0, Value::Int32(v))?;
        }

        let (a, b) = message.repeated_pair_mut(0, 0, 2).unwrap();
        assert_eq!((&*a, &*b), (&Value::Int32(1), &Value::Int32(3)));
        assert!(message.repeated_pair_mut(0, 2, 2).is_none());
        assert!(message.repeated_pair_mut(0, 1, 3).is_none());
        Ok(())
    }

    #[test]
    fn test_display() -> Result<(), String> {
        let parser = registry(
            "Point { required int32 x, required int32 y }
             Shape { optional string name, repeated Point points, optional bytes blob }",
        );
        let mut shape = Message::new(parser.get_descriptor("Shape").unwrap());
        assert_eq!(shape.to_string(), "Shape {}");

        shape.set(0, None, Value::Str(b"box".to_vec()))?;
        let mut point = Message::new(parser.get_descriptor("Point").unwrap());
        point.set(0, None, Value::Int32(1))?;
        point.set(1, None, Value::Int32(2))?;
        shape.push(1, Value::Message(point))?;
        shape.set(2, None, Value::Bytes(vec![0xde, 0xad]))?;

        assert_eq!(
            shape.to_string(),
            "Shape { name: \"box\", points: [Point { x: 1, y: 2 }], blob: 0xdead }"
        );
        Ok(())
    }

    #[test]
    fn test_field_path_display() {
        let path = FieldPath::new(vec![
            PathStep {
                field: 1,
                index: Some(2),
            },
            PathStep {
                field: 0,
                index: None,
            },
        ]);
        assert_eq!(path.to_string(), "[1[2].0]");
    }
}
