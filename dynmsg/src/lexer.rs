#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    OpenBrace,
    CloseBrace,
    Comma,
    Identifier(String),
    Comment(String),
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, String> {
        self.skip_whitespace();

        if self.position >= self.input.len() {
            return Ok(None);
        }

        let token = match self.current_char() {
            '{' => {
                self.advance();
                Token::OpenBrace
            }
            '}' => {
                self.advance();
                Token::CloseBrace
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '#' => {
                self.advance();
                let comment = self.read_until_newline();
                Token::Comment(comment)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                Token::Identifier(ident)
            }
            c => return Err(format!("Line {}: unexpected character: {}", self.line, c)),
        };

        Ok(Some(token))
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            if self.current_char() == '\n' {
                self.line += 1;
            }
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while self.position < self.input.len() {
            let c = self.current_char();
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_until_newline(&mut self) -> String {
        let mut text = String::new();
        while self.position < self.input.len() && self.current_char() != '\n' {
            text.push(self.current_char());
            self.advance();
        }
        text
    }
}
