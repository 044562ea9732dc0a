use dynmsg::message::{default_value, FieldPath, Message, Value};
use dynmsg::schema::{DescriptorParser, FieldDescriptor, FieldType};

use crate::value::{mutate_value, ValueMutator};

/// A resolved mutation site: one concrete field slot inside the tree.
/// Ephemeral by design; any structural edit to the owning message
/// invalidates it, so a site is never held across edits.
pub struct FieldRef<'m> {
    message: &'m mut Message,
    field: usize,
    index: Option<usize>,
}

impl<'m> FieldRef<'m> {
    pub(crate) fn new(message: &'m mut Message, field: usize, index: Option<usize>) -> Self {
        Self {
            message,
            field,
            index,
        }
    }

    pub fn resolve(root: &'m mut Message, path: &FieldPath) -> Result<Self, String> {
        let (last, prefix) = path
            .steps
            .split_last()
            .ok_or_else(|| "empty field path".to_string())?;
        let message = root
            .descend_mut(prefix)
            .ok_or_else(|| format!("dangling field path {}", path))?;
        if last.field >= message.field_count() {
            return Err(format!("field path {} out of range", path));
        }
        Ok(Self {
            message,
            field: last.field,
            index: last.index,
        })
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.message.descriptor().fields[self.field]
    }

    pub fn field_type(&self) -> &FieldType {
        &self.descriptor().field_type
    }

    pub fn default_value(&self, registry: &DescriptorParser) -> Result<Value, String> {
        default_value(self.field_type(), registry)
    }

    pub fn load(&self) -> Result<Value, String> {
        self.message
            .get(self.field, self.index)
            .cloned()
            .ok_or_else(|| format!("no value to load at field '{}'", self.descriptor().name))
    }

    /// Overwrites an existing slot.
    pub fn store(&mut self, value: Value) -> Result<(), String> {
        self.message.set(self.field, self.index, value)
    }

    /// Creates a new slot: repeated fields insert at the site's index,
    /// singular fields gain presence, choice-group members displace their
    /// siblings.
    pub fn create(&mut self, value: Value) -> Result<(), String> {
        self.message.insert(self.field, self.index, value)
    }

    pub fn delete(&mut self) -> Result<(), String> {
        self.message.remove(self.field, self.index)
    }

    /// Installs the schema default at the site.
    pub fn create_default(&mut self, registry: &DescriptorParser) -> Result<(), String> {
        let value = self.default_value(registry)?;
        self.create(value)
    }

    /// Installs a scalar-mutated copy of the schema default.
    pub fn create_mutated<V: ValueMutator>(
        &mut self,
        registry: &DescriptorParser,
        mutator: &mut V,
        size_hint: usize,
    ) -> Result<(), String> {
        let mut value = self.default_value(registry)?;
        mutate_value(mutator, &mut value, size_hint);
        self.create(value)
    }

    /// Loads, scalar-mutates, stores back.
    pub fn mutate_in_place<V: ValueMutator>(
        &mut self,
        mutator: &mut V,
        size_hint: usize,
    ) -> Result<(), String> {
        let mut value = self.load()?;
        mutate_value(mutator, &mut value, size_hint);
        self.store(value)
    }

    /// Overwrites the site with a value loaded from another site.
    pub fn copy_from(&mut self, source: Value) -> Result<(), String> {
        self.store(source)
    }

    /// Creates a new slot holding a value loaded from another site.
    pub fn append_from(&mut self, source: Value) -> Result<(), String> {
        self.create(source)
    }
}
