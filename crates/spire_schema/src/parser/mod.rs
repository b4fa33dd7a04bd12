//! Recursive-descent parser for annotated SDL.
//!
//! The parser accepts the type-system subset used by model schemas: object,
//! interface, input, enum, scalar and union definitions plus `extend type`.
//! Schema and directive definitions are rejected; the directive vocabulary is
//! fixed by the registered transformers.

pub mod error;
pub mod stream;

use crate::ast::{
    Definition, Directive, EnumType, EnumValue, FieldDefinition, InputObjectType, InputValue,
    ObjectType, ScalarType, SchemaDocument, TypeRef, UnionType, Value,
};
use crate::lexer::Token;
use error::SyntaxError;
use indexmap::IndexMap;
use logos::Logos;
use spire_core::CompileResult;
use stream::TokenStream;

/// Parse one SDL fragment
///
/// # Errors
///
/// Returns `ParseError` with the fragment index, line and column of the first
/// malformed token
pub fn parse_fragment(source: &str, fragment: usize) -> CompileResult<SchemaDocument> {
    parse_inner(source, fragment).map_err(|e| e.into_compile_error(fragment, source))
}

fn parse_inner(source: &str, fragment: usize) -> Result<SchemaDocument, SyntaxError> {
    let mut tokens = Vec::new();
    for (token, range) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push((token, range)),
            Err(()) => {
                let text = source.get(range.clone()).unwrap_or("");
                return Err(SyntaxError::new(
                    range.start,
                    format!("unexpected character sequence {text:?}"),
                ));
            }
        }
    }

    let mut parser = Parser {
        stream: TokenStream::new(tokens, source, fragment),
    };
    parser.document()
}

struct Parser<'src> {
    stream: TokenStream<'src>,
}

impl Parser<'_> {
    fn document(&mut self) -> Result<SchemaDocument, SyntaxError> {
        let mut doc = SchemaDocument::new();
        while !self.stream.at_end() {
            doc.definitions.push(self.definition()?);
        }
        Ok(doc)
    }

    fn description(&mut self) -> Option<String> {
        match self.stream.peek() {
            Some(Token::Str(s) | Token::BlockStr(s)) => {
                let s = s.clone();
                self.stream.advance();
                Some(s)
            }
            _ => None,
        }
    }

    fn definition(&mut self) -> Result<Definition, SyntaxError> {
        let description = self.description();
        let span = self.stream.span();
        let keyword = match self.stream.peek() {
            Some(Token::Name(k)) => k.clone(),
            _ => return Err(self.stream.error_expected("a type definition")),
        };

        match keyword.as_str() {
            "type" => {
                self.stream.advance();
                let mut object = self.object_body()?;
                object.description = description;
                object.span = span;
                Ok(Definition::Object(object))
            }
            "interface" => {
                self.stream.advance();
                let mut object = self.object_body()?;
                object.description = description;
                object.span = span;
                Ok(Definition::Interface(object))
            }
            "input" => {
                self.stream.advance();
                let name = self.stream.expect_name()?;
                let directives = self.directives()?;
                let fields = if self.stream.check(&Token::LBrace) {
                    self.input_values(&Token::LBrace, &Token::RBrace)?
                } else {
                    Vec::new()
                };
                Ok(Definition::Input(InputObjectType {
                    name,
                    description,
                    directives,
                    fields,
                    span,
                }))
            }
            "enum" => {
                self.stream.advance();
                let name = self.stream.expect_name()?;
                let directives = self.directives()?;
                let mut values = Vec::new();
                self.stream.expect(&Token::LBrace)?;
                while !self.stream.eat(&Token::RBrace) {
                    let description = self.description();
                    let value = self.stream.expect_name()?;
                    if matches!(value.as_str(), "true" | "false" | "null") {
                        return Err(self.stream.error(format!("{value} is not a valid enum value")));
                    }
                    values.push(EnumValue {
                        name: value,
                        description,
                        directives: self.directives()?,
                    });
                }
                Ok(Definition::Enum(EnumType {
                    name,
                    description,
                    directives,
                    values,
                    span,
                }))
            }
            "scalar" => {
                self.stream.advance();
                let name = self.stream.expect_name()?;
                let directives = self.directives()?;
                Ok(Definition::Scalar(ScalarType {
                    name,
                    description,
                    directives,
                    span,
                }))
            }
            "union" => {
                self.stream.advance();
                let name = self.stream.expect_name()?;
                let directives = self.directives()?;
                self.stream.expect(&Token::Equals)?;
                self.stream.eat(&Token::Pipe);
                let mut members = vec![self.stream.expect_name()?];
                while self.stream.eat(&Token::Pipe) {
                    members.push(self.stream.expect_name()?);
                }
                Ok(Definition::Union(UnionType {
                    name,
                    description,
                    directives,
                    members,
                    span,
                }))
            }
            "extend" => {
                self.stream.advance();
                if !self.stream.check_keyword("type") {
                    return Err(self.stream.error("only 'extend type' is supported"));
                }
                self.stream.advance();
                let mut object = self.object_body()?;
                object.span = span;
                Ok(Definition::ObjectExtension(object))
            }
            "schema" => Err(self
                .stream
                .error("schema definitions are not supported; root types are generated")),
            "directive" => Err(self
                .stream
                .error("directive definitions are not supported; the directive vocabulary is fixed")),
            _ => Err(self.stream.error_expected("a type definition")),
        }
    }

    fn object_body(&mut self) -> Result<ObjectType, SyntaxError> {
        let mut object = ObjectType::new(self.stream.expect_name()?);

        if self.stream.check_keyword("implements") {
            self.stream.advance();
            self.stream.eat(&Token::Amp);
            object.interfaces.push(self.stream.expect_name()?);
            while self.stream.eat(&Token::Amp) {
                object.interfaces.push(self.stream.expect_name()?);
            }
        }

        object.directives = self.directives()?;

        if self.stream.eat(&Token::LBrace) {
            while !self.stream.eat(&Token::RBrace) {
                if self.stream.at_end() {
                    return Err(self.stream.error_expected("'}'"));
                }
                object.fields.push(self.field()?);
            }
        }
        Ok(object)
    }

    fn field(&mut self) -> Result<FieldDefinition, SyntaxError> {
        let description = self.description();
        let span = self.stream.span();
        let name = self.stream.expect_name()?;
        let arguments = if self.stream.check(&Token::LParen) {
            self.input_values(&Token::LParen, &Token::RParen)?
        } else {
            Vec::new()
        };
        self.stream.expect(&Token::Colon)?;
        let ty = self.type_ref()?;
        let directives = self.directives()?;
        Ok(FieldDefinition {
            name,
            description,
            arguments,
            ty,
            directives,
            span,
        })
    }

    fn input_values(&mut self, open: &Token, close: &Token) -> Result<Vec<InputValue>, SyntaxError> {
        self.stream.expect(open)?;
        let mut values = Vec::new();
        while !self.stream.eat(close) {
            if self.stream.at_end() {
                return Err(self.stream.error_expected(&close.to_string()));
            }
            let description = self.description();
            let span = self.stream.span();
            let name = self.stream.expect_name()?;
            self.stream.expect(&Token::Colon)?;
            let ty = self.type_ref()?;
            let default_value = if self.stream.eat(&Token::Equals) {
                Some(self.value()?)
            } else {
                None
            };
            let directives = self.directives()?;
            values.push(InputValue {
                name,
                description,
                ty,
                default_value,
                directives,
                span,
            });
        }
        Ok(values)
    }

    fn type_ref(&mut self) -> Result<TypeRef, SyntaxError> {
        let base = if self.stream.eat(&Token::LBracket) {
            let inner = self.type_ref()?;
            self.stream.expect(&Token::RBracket)?;
            TypeRef::List(Box::new(inner))
        } else {
            TypeRef::Named(self.stream.expect_name()?)
        };
        if self.stream.eat(&Token::Bang) {
            Ok(TypeRef::NonNull(Box::new(base)))
        } else {
            Ok(base)
        }
    }

    fn directives(&mut self) -> Result<Vec<Directive>, SyntaxError> {
        let mut directives = Vec::new();
        while self.stream.check(&Token::At) {
            let span = self.stream.span();
            self.stream.advance();
            let name = self.stream.expect_name()?;
            let mut arguments = IndexMap::new();
            if self.stream.eat(&Token::LParen) {
                while !self.stream.eat(&Token::RParen) {
                    let arg = self.stream.expect_name()?;
                    self.stream.expect(&Token::Colon)?;
                    let value = self.value()?;
                    if arguments.insert(arg.clone(), value).is_some() {
                        return Err(self.stream.error(format!("duplicate argument '{arg}' on @{name}")));
                    }
                }
            }
            directives.push(Directive {
                name,
                arguments,
                span,
            });
        }
        Ok(directives)
    }

    fn value(&mut self) -> Result<Value, SyntaxError> {
        let Some(token) = self.stream.peek().cloned() else {
            return Err(self.stream.error_expected("a value"));
        };
        match token {
            Token::Int(i) => {
                self.stream.advance();
                Ok(Value::Int(i))
            }
            Token::Float(f) => {
                self.stream.advance();
                Ok(Value::Float(f))
            }
            Token::Str(s) | Token::BlockStr(s) => {
                self.stream.advance();
                Ok(Value::String(s))
            }
            Token::Name(name) => {
                self.stream.advance();
                Ok(match name.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    _ => Value::Enum(name),
                })
            }
            Token::LBracket => {
                self.stream.advance();
                let mut items = Vec::new();
                while !self.stream.eat(&Token::RBracket) {
                    if self.stream.at_end() {
                        return Err(self.stream.error_expected("']'"));
                    }
                    items.push(self.value()?);
                }
                Ok(Value::List(items))
            }
            Token::LBrace => {
                self.stream.advance();
                let mut fields = IndexMap::new();
                while !self.stream.eat(&Token::RBrace) {
                    let key = self.stream.expect_name()?;
                    self.stream.expect(&Token::Colon)?;
                    let value = self.value()?;
                    if fields.insert(key.clone(), value).is_some() {
                        return Err(self.stream.error(format!("duplicate object field '{key}'")));
                    }
                }
                Ok(Value::Object(fields))
            }
            Token::Dollar => Err(self.stream.error("variables are not allowed in schema documents")),
            _ => Err(self.stream.error_expected("a value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_core::CompileError;

    #[test]
    fn test_parse_model() {
        let doc = parse_fragment(
            r#"
            "A todo item"
            type Todo @model @auth(rules: [{allow: public}]) {
              id: ID!
              content: String @default(value: "hello")
              tags: [String!]!
            }
            "#,
            0,
        )
        .unwrap();

        let todo = doc.object("Todo").unwrap();
        assert_eq!(todo.description.as_deref(), Some("A todo item"));
        assert_eq!(todo.directives.len(), 2);
        assert_eq!(todo.fields.len(), 3);
        assert_eq!(todo.fields[2].ty.to_string(), "[String!]!");
        assert_eq!(todo.span.line, 3);

        let auth = todo.directive("auth").unwrap();
        let rules = auth.argument("rules").unwrap().as_list();
        let allow = rules[0].as_object().unwrap().get("allow").unwrap();
        assert_eq!(allow, &Value::Enum("public".to_string()));
    }

    #[test]
    fn test_parse_other_definitions() {
        let doc = parse_fragment(
            r#"
            enum Status { DRAFT PUBLISHED }
            scalar Url
            union Result = | Post | Comment
            input Filter { eq: String = "x", limit: Int = 10 }
            interface Node { id: ID! }
            type Post implements Node & Entity { id: ID! }
            extend type Post { extra(arg: Int = 1): String }
            "#,
            0,
        )
        .unwrap();

        assert_eq!(doc.definitions.len(), 7);
        assert!(doc.enum_type("Status").unwrap().has_value("PUBLISHED"));
        match &doc.definitions[2] {
            Definition::Union(u) => assert_eq!(u.members, vec!["Post", "Comment"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            doc.input("Filter").unwrap().fields[1].default_value,
            Some(Value::Int(10))
        );
        assert_eq!(doc.object("Post").unwrap().interfaces, vec!["Node", "Entity"]);
        assert!(matches!(doc.definitions[6], Definition::ObjectExtension(_)));
    }

    #[test]
    fn test_keywords_as_field_names() {
        let doc = parse_fragment("type Event { type: String input: Int }", 0).unwrap();
        let event = doc.object("Event").unwrap();
        assert!(event.has_field("type"));
        assert!(event.has_field("input"));
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse_fragment("type Todo {\n  id ID!\n}", 3).unwrap_err();
        match err {
            CompileError::Parse {
                fragment,
                line,
                column,
                ..
            } => assert_eq!((fragment, line, column), (3, 2, 6)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reject_schema_and_directive_definitions() {
        assert!(parse_fragment("schema { query: Q }", 0).is_err());
        assert!(parse_fragment("directive @x on OBJECT", 0).is_err());
    }

    #[test]
    fn test_reject_unterminated_type() {
        let err = parse_fragment("type Todo { id: ID!", 0).unwrap_err();
        assert_eq!(err.code(), "ParseError");
    }

    #[test]
    fn test_duplicate_directive_argument() {
        assert!(parse_fragment("type A @model(queries: null, queries: null) { id: ID! }", 0).is_err());
    }
}
