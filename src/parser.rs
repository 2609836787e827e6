use crate::ast::*;
use crate::lexer::{LexError, Lexer, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Unexpected token: {0:?}, expected {1}")]
    Unexpected(Token, &'static str),
    #[error("Unexpected end of input")]
    UnexpectedEof,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> &Token {
        let tok = self.tokens.get(self.pos).unwrap_or(&Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) => Ok(s),
            Token::Eof => Err(ParseError::UnexpectedEof),
            tok => Err(ParseError::Unexpected(tok, "identifier")),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        let tok = self.advance().clone();
        if tok == expected {
            Ok(())
        } else if tok == Token::Eof {
            Err(ParseError::UnexpectedEof)
        } else {
            Err(ParseError::Unexpected(tok, "specific token"))
        }
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == name)
    }

    fn skip_comma(&mut self) {
        if *self.peek() == Token::Comma {
            self.advance();
        }
    }

    pub fn parse(&mut self) -> Result<Model, ParseError> {
        let mut model = Model::default();

        while *self.peek() != Token::Eof {
            let keyword = match self.peek().clone() {
                Token::Ident(s) => s,
                tok => {
                    return Err(ParseError::Unexpected(
                        tok,
                        "class stereotype, enum, gen, genset, or rel",
                    ));
                }
            };

            if let Some(stereotype) = Stereotype::from_str(&keyword) {
                self.advance();
                let (class, generals) = self.parse_class(stereotype)?;
                for general in generals {
                    model.generalizations.push(Generalization {
                        general,
                        specific: class.name.clone(),
                    });
                }
                model.classes.push(class);
            } else if keyword == "enum" {
                self.advance();
                model.enumerations.push(self.parse_enum()?);
            } else if keyword == "gen" {
                self.advance();
                model.generalizations.push(self.parse_generalization()?);
            } else if keyword == "genset" {
                self.advance();
                model.generalization_sets.push(self.parse_genset()?);
            } else if keyword == "rel" {
                self.advance();
                model.relations.extend(self.parse_rel_block()?);
            } else {
                return Err(ParseError::Unexpected(
                    self.peek().clone(),
                    "class stereotype, enum, gen, genset, or rel",
                ));
            }
        }

        Ok(model)
    }

    /// Parse `Name [: General, ...] [{ attributes }]` after the stereotype keyword.
    fn parse_class(&mut self, stereotype: Stereotype) -> Result<(Class, Vec<String>), ParseError> {
        let name = self.expect_ident()?;

        let mut generals = Vec::new();
        if *self.peek() == Token::Colon {
            self.advance();
            generals = self.parse_ident_list()?;
        }

        let mut attributes = Vec::new();
        if *self.peek() == Token::LBrace {
            self.advance();
            while *self.peek() != Token::RBrace {
                if *self.peek() == Token::Eof {
                    return Err(ParseError::UnexpectedEof);
                }
                attributes.push(self.parse_attribute()?);
                self.skip_comma();
            }
            self.expect(Token::RBrace)?;
        }

        Ok((
            Class {
                name,
                stereotype,
                attributes,
            },
            generals,
        ))
    }

    fn parse_attribute(&mut self) -> Result<Attribute, ParseError> {
        let name = self.expect_ident()?;
        let typ = self.expect_ident()?;
        let cardinality = self.parse_cardinality()?;

        Ok(Attribute {
            name,
            typ,
            cardinality,
        })
    }

    fn parse_enum(&mut self) -> Result<Enumeration, ParseError> {
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;

        let mut literals = Vec::new();
        while *self.peek() != Token::RBrace {
            match self.advance().clone() {
                Token::Ident(s) | Token::Str(s) => literals.push(s),
                Token::Eof => return Err(ParseError::UnexpectedEof),
                tok => return Err(ParseError::Unexpected(tok, "enumeration literal")),
            }
            self.skip_comma();
        }

        self.expect(Token::RBrace)?;
        Ok(Enumeration { name, literals })
    }

    fn parse_generalization(&mut self) -> Result<Generalization, ParseError> {
        let specific = self.expect_ident()?;
        self.expect(Token::Arrow)?;
        let general = self.expect_ident()?;
        Ok(Generalization { general, specific })
    }

    /// Parse `[SetName :] General [disjoint] [complete] { Specific, ... }`.
    fn parse_genset(&mut self) -> Result<GeneralizationSet, ParseError> {
        let first = self.expect_ident()?;
        let (name, general) = if *self.peek() == Token::Colon {
            self.advance();
            (Some(first), self.expect_ident()?)
        } else {
            (None, first)
        };

        let mut disjoint = false;
        let mut complete = false;
        loop {
            if self.check_ident("disjoint") {
                self.advance();
                disjoint = true;
            } else if self.check_ident("complete") {
                self.advance();
                complete = true;
            } else {
                break;
            }
        }

        self.expect(Token::LBrace)?;
        let specifics = if *self.peek() == Token::RBrace {
            Vec::new()
        } else {
            self.parse_ident_list()?
        };
        self.expect(Token::RBrace)?;

        Ok(GeneralizationSet {
            name,
            general,
            specifics,
            disjoint,
            complete,
        })
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut list = vec![self.expect_ident()?];
        while *self.peek() == Token::Comma {
            self.advance();
            list.push(self.expect_ident()?);
        }
        Ok(list)
    }

    fn parse_rel_block(&mut self) -> Result<Vec<Relation>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut rels = Vec::new();

        while *self.peek() != Token::RBrace {
            if *self.peek() == Token::Eof {
                return Err(ParseError::UnexpectedEof);
            }
            rels.push(self.parse_relation()?);
        }

        self.expect(Token::RBrace)?;
        Ok(rels)
    }

    fn parse_relation(&mut self) -> Result<Relation, ParseError> {
        let source = self.expect_ident()?;
        let source_cardinality = self.parse_cardinality()?;
        self.expect(Token::Dash)?;
        let target_cardinality = self.parse_cardinality()?;
        let target = self.expect_ident()?;

        let mut name = None;
        let mut enumeration = None;

        if *self.peek() == Token::Colon {
            self.advance();
            match self.advance().clone() {
                Token::Str(s) => name = Some(s),
                tok => return Err(ParseError::Unexpected(tok, "string label")),
            }
        }

        if self.check_ident("with") {
            self.advance();
            enumeration = Some(self.expect_ident()?);
        }

        Ok(Relation {
            name,
            source,
            source_cardinality,
            target,
            target_cardinality,
            enumeration,
        })
    }

    /// Read an optional cardinality and return it as written, e.g. `0..*`.
    fn parse_cardinality(&mut self) -> Result<Option<String>, ParseError> {
        let lower = match self.peek().clone() {
            Token::Star => {
                self.advance();
                return Ok(Some("*".to_string()));
            }
            Token::Num(n) => {
                self.advance();
                n
            }
            _ => return Ok(None),
        };

        if *self.peek() != Token::DotDot {
            return Ok(Some(lower.to_string()));
        }
        self.advance();

        match self.advance().clone() {
            Token::Star => Ok(Some(format!("{}..*", lower))),
            Token::Num(upper) => Ok(Some(format!("{}..{}", lower, upper))),
            tok => Err(ParseError::Unexpected(tok, "upper bound after ..")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class() {
        let input = r#"
            kind Person {
                name string 1
                nickname string 0..*
                birth date
            }
        "#;
        let model = Parser::new(input).unwrap().parse().unwrap();
        assert_eq!(model.classes.len(), 1);
        let person = &model.classes[0];
        assert_eq!(person.name, "Person");
        assert_eq!(person.stereotype, Stereotype::Kind);
        assert_eq!(person.attributes.len(), 3);
        assert_eq!(person.attributes[0].cardinality.as_deref(), Some("1"));
        assert_eq!(person.attributes[1].cardinality.as_deref(), Some("0..*"));
        assert_eq!(person.attributes[2].cardinality, None);
    }

    #[test]
    fn test_parse_class_with_generals() {
        let input = r#"
            kind Person
            role Customer : Person
            subkind Employee : Person, Agent
        "#;
        let model = Parser::new(input).unwrap().parse().unwrap();
        assert_eq!(model.classes.len(), 3);
        assert_eq!(model.generalizations.len(), 3);
        assert_eq!(model.generalizations[0].general, "Person");
        assert_eq!(model.generalizations[0].specific, "Customer");
        assert_eq!(model.generalizations[2].general, "Agent");
    }

    #[test]
    fn test_parse_relation() {
        let input = r#"
            rel {
                Person 1 -- 0..1 Passport : "holds"
                Student * -- * Course : "enrolls" with Grade
                Person -- Car
            }
        "#;
        let model = Parser::new(input).unwrap().parse().unwrap();
        assert_eq!(model.relations.len(), 3);
        assert_eq!(model.relations[0].name, Some("holds".into()));
        assert_eq!(model.relations[0].target_cardinality.as_deref(), Some("0..1"));
        assert_eq!(model.relations[1].enumeration, Some("Grade".into()));
        assert_eq!(model.relations[2].source_cardinality, None);
        assert_eq!(model.relations[2].target_cardinality, None);
    }

    #[test]
    fn test_parse_genset() {
        let input = r#"
            genset Organization disjoint complete { ForProfit, NonProfit }
            genset LifeStage : Person { Child, Adult }
        "#;
        let model = Parser::new(input).unwrap().parse().unwrap();
        assert_eq!(model.generalization_sets.len(), 2);
        let first = &model.generalization_sets[0];
        assert_eq!(first.general, "Organization");
        assert!(first.disjoint && first.complete);
        assert_eq!(first.specifics, vec!["ForProfit", "NonProfit"]);
        let second = &model.generalization_sets[1];
        assert_eq!(second.name, Some("LifeStage".into()));
        assert_eq!(second.general, "Person");
        assert!(!second.disjoint);
    }

    #[test]
    fn test_parse_enum_and_gen() {
        let input = r#"
            enum Grade { A, B C }
            gen Student -> Person
        "#;
        let model = Parser::new(input).unwrap().parse().unwrap();
        assert_eq!(model.enumerations[0].literals, vec!["A", "B", "C"]);
        assert_eq!(model.generalizations[0].specific, "Student");
    }

    #[test]
    fn test_parse_unicode() {
        let input = r#"
            kind 人 {
                名前 string 1
            }
        "#;
        let model = Parser::new(input).unwrap().parse().unwrap();
        assert_eq!(model.classes[0].name, "人");
        assert_eq!(model.classes[0].attributes[0].name, "名前");
    }

    #[test]
    fn test_parse_unknown_keyword() {
        let err = Parser::new("entity User {}").unwrap().parse().unwrap_err();
        assert!(matches!(err, ParseError::Unexpected(..)));
    }

    #[test]
    fn test_parse_unterminated_block() {
        let err = Parser::new("kind Person { name string").unwrap().parse().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof));
    }
}
