use crate::lexer::{Lexer, Token};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Str,
    Bytes,
    Enum(String),
    Message(String),
}

impl FieldType {
    pub fn is_message(&self) -> bool {
        matches!(self, FieldType::Message(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub label: Label,
    /// Index into the owning descriptor's `oneofs` when this field is a
    /// choice-group member.
    pub oneof: Option<usize>,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.label == Label::Required
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneofDescriptor {
    pub name: String,
    /// Member field indices, in declaration order. At most one member is
    /// set at a time.
    pub fields: Vec<usize>,
}

#[derive(Debug, PartialEq)]
pub struct Descriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub oneofs: Vec<OneofDescriptor>,
}

#[derive(Debug, PartialEq)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<String>,
}

/// Parses schema declarations and registers the resulting descriptors by
/// name. Named type references are resolved once a whole file has been
/// consumed, so forward and self references work.
pub struct DescriptorParser {
    pub descriptors: HashMap<String, Arc<Descriptor>>,
    pub enums: HashMap<String, Arc<EnumDescriptor>>,
    current_line: usize,
}

fn is_reserved_word(name: &str) -> bool {
    matches!(
        name,
        "int32"
            | "int64"
            | "uint32"
            | "uint64"
            | "float"
            | "double"
            | "bool"
            | "string"
            | "bytes"
            | "enum"
            | "oneof"
            | "optional"
            | "required"
            | "repeated"
    )
}

impl DescriptorParser {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
            enums: HashMap::new(),
            current_line: 0,
        }
    }

    pub fn get_descriptor(&self, name: &str) -> Option<Arc<Descriptor>> {
        self.descriptors.get(name).cloned()
    }

    pub fn get_enum(&self, name: &str) -> Option<Arc<EnumDescriptor>> {
        self.enums.get(name).cloned()
    }

    fn err(&self, msg: String) -> String {
        format!("Line {}: {}", self.current_line, msg)
    }

    pub fn parse_file(&mut self, content: &str) -> Result<(), String> {
        let mut lexer = Lexer::new(content);
        let mut tokens = Vec::new();

        while let Some(token) = lexer.next_token()? {
            match token {
                Token::Comment(_) => continue,
                _ => tokens.push((token, lexer.line())),
            }
        }

        let mut pending = Vec::new();
        let mut position = 0;
        while position < tokens.len() {
            position = self.parse_decl(&tokens, position, &mut pending)?;
        }

        self.resolve(&mut pending)?;
        for descriptor in pending {
            self.descriptors
                .insert(descriptor.name.clone(), Arc::new(descriptor));
        }
        Ok(())
    }

    /// Reads the token at `position`, remembering its line for error
    /// reporting.
    fn tok<'t>(&mut self, tokens: &'t [(Token, usize)], position: usize) -> Option<&'t Token> {
        tokens.get(position).map(|(token, line)| {
            self.current_line = *line;
            token
        })
    }

    fn ident(
        &mut self,
        tokens: &[(Token, usize)],
        position: usize,
        what: &str,
    ) -> Result<String, String> {
        match self.tok(tokens, position) {
            Some(Token::Identifier(name)) => Ok(name.clone()),
            other => Err(self.err(format!("expected {}, found {:?}", what, other))),
        }
    }

    fn parse_decl(
        &mut self,
        tokens: &[(Token, usize)],
        position: usize,
        pending: &mut Vec<Descriptor>,
    ) -> Result<usize, String> {
        match self.tok(tokens, position) {
            Some(Token::Identifier(name)) if name == "enum" => {
                self.parse_enum(tokens, position + 1, pending)
            }
            Some(Token::Identifier(_)) => self.parse_message(tokens, position, pending),
            other => Err(self.err(format!("expected declaration, found {:?}", other))),
        }
    }

    fn parse_enum(
        &mut self,
        tokens: &[(Token, usize)],
        start: usize,
        pending: &[Descriptor],
    ) -> Result<usize, String> {
        let mut position = start;
        let name = self.ident(tokens, position, "enum name")?;
        position += 1;

        if is_reserved_word(&name) {
            return Err(self.err(format!("'{}' cannot be used as an enum name", name)));
        }
        if self.enums.contains_key(&name)
            || self.descriptors.contains_key(&name)
            || pending.iter().any(|d| d.name == name)
        {
            return Err(self.err(format!("duplicate type name '{}'", name)));
        }

        match self.tok(tokens, position) {
            Some(Token::OpenBrace) => position += 1,
            other => return Err(self.err(format!("expected '{{', found {:?}", other))),
        }

        let mut values: Vec<String> = Vec::new();
        loop {
            match self.tok(tokens, position) {
                Some(Token::CloseBrace) => {
                    position += 1;
                    break;
                }
                Some(Token::Comma) => position += 1,
                Some(Token::Identifier(value)) => {
                    let value = value.clone();
                    if values.contains(&value) {
                        return Err(self.err(format!("duplicate enum value '{}'", value)));
                    }
                    values.push(value);
                    position += 1;
                }
                other => return Err(self.err(format!("expected enum value, found {:?}", other))),
            }
        }

        if values.is_empty() {
            return Err(self.err(format!("enum '{}' has no values", name)));
        }

        self.enums
            .insert(name.clone(), Arc::new(EnumDescriptor { name, values }));
        Ok(position)
    }

    fn parse_message(
        &mut self,
        tokens: &[(Token, usize)],
        start: usize,
        pending: &mut Vec<Descriptor>,
    ) -> Result<usize, String> {
        let mut position = start;
        let name = self.ident(tokens, position, "message name")?;
        position += 1;

        if is_reserved_word(&name) {
            return Err(self.err(format!("'{}' cannot be used as a message name", name)));
        }
        if self.descriptors.contains_key(&name)
            || self.enums.contains_key(&name)
            || pending.iter().any(|d| d.name == name)
        {
            return Err(self.err(format!("duplicate type name '{}'", name)));
        }

        match self.tok(tokens, position) {
            Some(Token::OpenBrace) => position += 1,
            other => return Err(self.err(format!("expected '{{', found {:?}", other))),
        }

        let mut descriptor = Descriptor {
            name,
            fields: Vec::new(),
            oneofs: Vec::new(),
        };

        loop {
            match self.tok(tokens, position) {
                Some(Token::CloseBrace) => {
                    position += 1;
                    break;
                }
                Some(Token::Comma) => position += 1,
                Some(Token::Identifier(word)) => {
                    let word = word.clone();
                    position += 1;
                    if word == "oneof" {
                        position = self.parse_oneof(tokens, position, &mut descriptor)?;
                    } else {
                        position = self.parse_field(tokens, position, &word, &mut descriptor)?;
                    }
                }
                other => {
                    return Err(self.err(format!("expected field definition, found {:?}", other)))
                }
            }
        }

        pending.push(descriptor);
        Ok(position)
    }

    fn parse_field(
        &mut self,
        tokens: &[(Token, usize)],
        start: usize,
        label_word: &str,
        descriptor: &mut Descriptor,
    ) -> Result<usize, String> {
        let mut position = start;
        let label = match label_word {
            "optional" => Label::Optional,
            "required" => Label::Required,
            "repeated" => Label::Repeated,
            other => {
                return Err(self.err(format!(
                    "expected 'optional', 'required' or 'repeated', found '{}'",
                    other
                )))
            }
        };

        let type_name = self.ident(tokens, position, "field type")?;
        position += 1;
        let field_type = parse_type(&type_name);

        let field_name = self.ident(tokens, position, "field name")?;
        position += 1;

        if descriptor.fields.iter().any(|f| f.name == field_name) {
            return Err(self.err(format!(
                "duplicate field '{}' in message '{}'",
                field_name, descriptor.name
            )));
        }

        descriptor.fields.push(FieldDescriptor {
            name: field_name,
            field_type,
            label,
            oneof: None,
        });
        Ok(position)
    }

    fn parse_oneof(
        &mut self,
        tokens: &[(Token, usize)],
        start: usize,
        descriptor: &mut Descriptor,
    ) -> Result<usize, String> {
        let mut position = start;
        let name = self.ident(tokens, position, "oneof name")?;
        position += 1;

        match self.tok(tokens, position) {
            Some(Token::OpenBrace) => position += 1,
            other => return Err(self.err(format!("expected '{{', found {:?}", other))),
        }

        let group = descriptor.oneofs.len();
        let mut members = Vec::new();
        loop {
            match self.tok(tokens, position) {
                Some(Token::CloseBrace) => {
                    position += 1;
                    break;
                }
                Some(Token::Comma) => position += 1,
                Some(Token::Identifier(type_name)) => {
                    let type_name = type_name.clone();
                    position += 1;
                    let field_type = parse_type(&type_name);

                    let field_name = self.ident(tokens, position, "oneof member name")?;
                    position += 1;

                    if descriptor.fields.iter().any(|f| f.name == field_name) {
                        return Err(self.err(format!(
                            "duplicate field '{}' in message '{}'",
                            field_name, descriptor.name
                        )));
                    }

                    members.push(descriptor.fields.len());
                    descriptor.fields.push(FieldDescriptor {
                        name: field_name,
                        field_type,
                        // Choice-group members behave as optional fields with
                        // mutual exclusion layered on top.
                        label: Label::Optional,
                        oneof: Some(group),
                    });
                }
                other => {
                    return Err(self.err(format!("expected oneof member, found {:?}", other)))
                }
            }
        }

        if members.is_empty() {
            return Err(self.err(format!("oneof '{}' has no members", name)));
        }

        descriptor.oneofs.push(OneofDescriptor {
            name,
            fields: members,
        });
        Ok(position)
    }

    fn resolve(&self, pending: &mut [Descriptor]) -> Result<(), String> {
        let new_names: Vec<String> = pending.iter().map(|d| d.name.clone()).collect();
        for descriptor in pending.iter_mut() {
            for field in descriptor.fields.iter_mut() {
                let referenced = match &field.field_type {
                    FieldType::Message(name) => name.clone(),
                    _ => continue,
                };
                if self.enums.contains_key(&referenced) {
                    field.field_type = FieldType::Enum(referenced);
                } else if self.descriptors.contains_key(&referenced)
                    || new_names.contains(&referenced)
                {
                    // A genuine sub-message reference; keep as is.
                } else {
                    return Err(format!(
                        "unknown type '{}' referenced by field '{}' in message '{}'",
                        referenced, field.name, descriptor.name
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for DescriptorParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_type(name: &str) -> FieldType {
    match name {
        "int32" => FieldType::Int32,
        "int64" => FieldType::Int64,
        "uint32" => FieldType::UInt32,
        "uint64" => FieldType::UInt64,
        "float" => FieldType::Float,
        "double" => FieldType::Double,
        "bool" => FieldType::Bool,
        "string" => FieldType::Str,
        "bytes" => FieldType::Bytes,
        // Resolved to Enum or Message once the whole file is parsed.
        other => FieldType::Message(other.to_string()),
    }
}
