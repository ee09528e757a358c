//! DDL ingestion: `CREATE FOREIGN TABLE`, `CREATE VIEW`, procedures,
//! functions, `INSTEAD OF` triggers and `SET NAMESPACE`.
//!
//! Statements are applied to the factory in textual order. Each statement is
//! built off to the side and committed only when it is complete, so a failing
//! statement leaves the factory exactly as the previous statements left it.

use fedq_lang::{Block, Command, CreateProcedure, QueryParser, TokenStream, TriggerAction};
use sqlparser::tokenizer::Token;
use tracing::debug;

use crate::error::{MetaError, Result};
use crate::factory::{add_foreign_key, add_key, MetadataFactory};
use crate::model::{
    Column, Datatype, Determinism, FunctionMethod, FunctionParameter, KeyType, NullType,
    ParameterType, ProcedureParameter, Properties, Table, TableKind,
};

const CONSTRAINT_WORDS: &[&str] = &["PRIMARY", "UNIQUE", "INDEX", "ACCESSPATTERN", "FOREIGN"];

/// Parse `text` and apply every statement to `factory`.
pub fn parse_ddl(factory: &mut MetadataFactory, text: &str) -> Result<()> {
    let mut parser = DdlParser {
        ts: TokenStream::tokenize(text)?,
        factory,
    };
    loop {
        while parser.ts.consume_token(&Token::SemiColon) {}
        if parser.ts.is_eof() {
            return Ok(());
        }
        parser.statement()?;
    }
}

struct DdlParser<'a> {
    ts: TokenStream,
    factory: &'a mut MetadataFactory,
}

struct TypeSpec {
    datatype: Datatype,
    length: u32,
    precision: u32,
    scale: u32,
}

#[derive(Default)]
struct InlineKeys {
    primary: bool,
    unique: bool,
    index: bool,
}

impl<'a> DdlParser<'a> {
    fn statement(&mut self) -> Result<()> {
        if self.ts.consume_keywords(&["SET", "NAMESPACE"]) {
            return self.namespace();
        }
        self.ts.expect_keyword("CREATE")?;
        if self.ts.consume_keyword("FOREIGN") {
            if self.ts.consume_keyword("TABLE") {
                return self.table(TableKind::Physical);
            }
            if self.ts.consume_keyword("PROCEDURE") {
                return self.procedure(Some(false));
            }
            self.ts.expect_keyword("FUNCTION")?;
            return self.function(false);
        }
        if self.ts.consume_keyword("VIRTUAL") {
            if self.ts.consume_keyword("VIEW") {
                return self.table(TableKind::View);
            }
            if self.ts.consume_keyword("PROCEDURE") {
                return self.procedure(Some(true));
            }
            self.ts.expect_keyword("FUNCTION")?;
            return self.function(true);
        }
        if self.ts.consume_keyword("VIEW") {
            return self.table(TableKind::View);
        }
        if self.ts.consume_keyword("TABLE") {
            return self.table(TableKind::Physical);
        }
        if self.ts.consume_keyword("PROCEDURE") {
            return self.procedure(None);
        }
        if self.ts.consume_keyword("FUNCTION") {
            return self.function(false);
        }
        if self.ts.consume_keyword("TRIGGER") {
            return self.trigger();
        }
        Err(self.ts.unexpected("TABLE, VIEW, PROCEDURE, FUNCTION or TRIGGER").into())
    }

    fn namespace(&mut self) -> Result<()> {
        let uri = self.literal()?;
        self.ts.expect_keyword("AS")?;
        let prefix = self.literal()?;
        debug!(prefix = %prefix, uri = %uri, "namespace declared");
        self.factory.add_namespace(&prefix, uri);
        Ok(())
    }

    // ----- tables and views -----

    fn table(&mut self, kind: TableKind) -> Result<()> {
        let name = self.ts.parse_qualified_name()?;
        let mut table = self.factory.new_table(name.clone(), kind);
        if self.ts.consume_token(&Token::LParen) {
            self.table_elements(&mut table)?;
        }
        if self.ts.peek_keyword("OPTIONS") {
            for (key, value) in self.options()? {
                apply_table_option(&mut table, key, value);
            }
        }
        match kind {
            TableKind::View => {
                if !self.ts.consume_keyword("AS") {
                    return Err(MetaError::MissingPlan { kind: "view", name });
                }
                let body = self.body_text();
                if body.is_empty() {
                    return Err(MetaError::MissingPlan { kind: "view", name });
                }
                table.select_transformation = Some(canonical_query(&body));
            }
            TableKind::Physical => {
                if self.ts.peek_keyword("AS") {
                    return Err(self.ts.unexpected("end of foreign table").into());
                }
            }
        }
        self.factory.add_table(table)?;
        debug!(model = %self.factory.model_name(), table = %name, ?kind, "ddl table applied");
        Ok(())
    }

    fn table_elements(&mut self, table: &mut Table) -> Result<()> {
        if self.ts.consume_token(&Token::RParen) {
            return Ok(());
        }
        loop {
            if self.ts.consume_keyword("CONSTRAINT") {
                let name = if self.ts.peek_any_keyword(CONSTRAINT_WORDS) {
                    None
                } else {
                    Some(self.ts.parse_identifier()?)
                };
                self.constraint(table, name)?;
            } else if self.ts.peek_any_keyword(CONSTRAINT_WORDS) {
                self.constraint(table, None)?;
            } else {
                self.column(table)?;
            }
            if self.ts.consume_token(&Token::Comma) || self.ts.peek_keyword("CONSTRAINT") {
                continue;
            }
            self.ts.expect_token(&Token::RParen)?;
            return Ok(());
        }
    }

    fn column(&mut self, table: &mut Table) -> Result<()> {
        let name = self.ts.parse_identifier()?;
        let spec = self.type_spec()?;
        let mut column = self.factory.new_column(name.clone(), &spec.datatype.name)?;
        column.length = spec.length;
        column.precision = spec.precision;
        column.scale = spec.scale;

        let mut keys = InlineKeys::default();
        loop {
            if self.ts.consume_keywords(&["NOT", "NULL"]) {
                column.null_type = NullType::NoNulls;
            } else if self.ts.consume_keyword("NULL") {
                column.null_type = NullType::Nullable;
            } else if self.ts.consume_keyword("AUTO_INCREMENT") {
                column.auto_increment = true;
            } else if self.ts.consume_keywords(&["PRIMARY", "KEY"]) {
                keys.primary = true;
            } else if self.ts.consume_keyword("UNIQUE") {
                keys.unique = true;
            } else if self.ts.consume_keyword("INDEX") {
                keys.index = true;
            } else if self.ts.consume_keyword("DEFAULT") {
                column.default_value = Some(self.literal()?);
            } else if self.ts.peek_keyword("OPTIONS") {
                for (key, value) in self.options()? {
                    apply_column_option(&mut column, key, value);
                }
            } else {
                break;
            }
        }
        table.add_column(column);

        let cols = [name];
        if keys.primary {
            add_key(table, KeyType::Primary, None, &cols)?;
        }
        if keys.unique {
            add_key(table, KeyType::Unique, None, &cols)?;
        }
        if keys.index {
            add_key(table, KeyType::Index, None, &cols)?;
        }
        Ok(())
    }

    fn constraint(&mut self, table: &mut Table, name: Option<String>) -> Result<()> {
        if self.ts.consume_keywords(&["PRIMARY", "KEY"]) {
            let cols = self.name_list()?;
            return add_key(table, KeyType::Primary, name, &cols);
        }
        if self.ts.consume_keyword("UNIQUE") {
            let cols = self.name_list()?;
            return add_key(table, KeyType::Unique, name, &cols);
        }
        if self.ts.consume_keyword("INDEX") {
            let cols = self.name_list()?;
            return add_key(table, KeyType::Index, name, &cols);
        }
        if self.ts.consume_keyword("ACCESSPATTERN") {
            let cols = self.name_list()?;
            return add_key(table, KeyType::AccessPattern, name, &cols);
        }
        self.ts.expect_keyword("FOREIGN")?;
        self.ts.expect_keyword("KEY")?;
        let cols = self.name_list()?;
        self.ts.expect_keyword("REFERENCES")?;
        let reference = self.ts.parse_qualified_name()?;
        let reference_columns = if self.ts.peek_token(&Token::LParen) {
            Some(self.name_list()?)
        } else {
            None
        };
        add_foreign_key(table, name, &cols, reference, reference_columns)
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        self.ts.expect_token(&Token::LParen)?;
        let mut names = Vec::new();
        loop {
            names.push(self.ts.parse_identifier()?);
            if self.ts.consume_token(&Token::RParen) {
                return Ok(names);
            }
            self.ts.expect_token(&Token::Comma)?;
        }
    }

    fn type_spec(&mut self) -> Result<TypeSpec> {
        let type_name = self.ts.parse_identifier()?;
        let datatype = self.factory.datatype(&type_name)?;
        let (mut length, mut precision, mut scale) = (0, 0, 0);
        if self.ts.consume_token(&Token::LParen) {
            let first = self.unsigned()?;
            if self.ts.consume_token(&Token::Comma) {
                precision = first;
                scale = self.unsigned()?;
            } else if datatype.runtime_type.is_numeric() {
                precision = first;
            } else {
                length = first;
            }
            self.ts.expect_token(&Token::RParen)?;
        }
        Ok(TypeSpec {
            datatype,
            length,
            precision,
            scale,
        })
    }

    fn unsigned(&mut self) -> Result<u32> {
        match self.ts.next_token() {
            Some(Token::Number(n, _)) => n
                .parse::<u32>()
                .map_err(|_| self.ts.error(format!("invalid size '{}'", n)).into()),
            _ => Err(self.ts.error("expected a number").into()),
        }
    }

    // ----- procedures, functions, triggers -----

    fn procedure(&mut self, declared_virtual: Option<bool>) -> Result<()> {
        let name = self.ts.parse_qualified_name()?;
        let mut procedure = self.factory.new_procedure(name.clone());
        self.ts.expect_token(&Token::LParen)?;
        if !self.ts.consume_token(&Token::RParen) {
            loop {
                let param_type = if self.ts.consume_keyword("INOUT") {
                    ParameterType::InOut
                } else if self.ts.consume_keyword("OUT") {
                    ParameterType::Out
                } else {
                    self.ts.consume_keyword("IN");
                    ParameterType::In
                };
                let param_name = self.ts.parse_identifier()?;
                let spec = self.type_spec()?;
                let vararg = self.ts.consume_keyword("VARARG");
                procedure.parameters.push(ProcedureParameter {
                    name: param_name,
                    uuid: fedq_core::id::generate_record_uuid(),
                    param_type,
                    datatype: spec.datatype,
                    length: spec.length,
                    precision: spec.precision,
                    scale: spec.scale,
                    position: procedure.parameters.len() + 1,
                    vararg,
                });
                if self.ts.consume_token(&Token::RParen) {
                    break;
                }
                self.ts.expect_token(&Token::Comma)?;
            }
        }
        if self.ts.consume_keyword("RETURNS") {
            if self.ts.consume_token(&Token::LParen) {
                let mut holder = self.factory.new_table(format!("{}.result", name), TableKind::View);
                self.table_elements(&mut holder)?;
                procedure.result_set = Some(holder.columns);
            } else {
                let spec = self.type_spec()?;
                procedure.parameters.insert(
                    0,
                    ProcedureParameter {
                        name: "return".into(),
                        uuid: fedq_core::id::generate_record_uuid(),
                        param_type: ParameterType::ReturnValue,
                        datatype: spec.datatype,
                        length: spec.length,
                        precision: spec.precision,
                        scale: spec.scale,
                        position: 0,
                        vararg: false,
                    },
                );
            }
        }
        if self.ts.peek_keyword("OPTIONS") {
            for (key, value) in self.options()? {
                match key.to_ascii_uppercase().as_str() {
                    "UUID" => procedure.uuid = value,
                    "NAMEINSOURCE" => procedure.name_in_source = Some(value),
                    "ANNOTATION" => procedure.annotation = Some(value),
                    "UPDATECOUNT" => {
                        procedure.update_count = value.parse().map_err(|_| {
                            MetaError::resolve(format!("invalid UPDATECOUNT '{}'", value))
                        })?
                    }
                    _ => {
                        procedure.properties.insert(key, value);
                    }
                }
            }
        }
        if self.ts.consume_keyword("AS") {
            if declared_virtual == Some(false) {
                return Err(self.ts.error("a foreign procedure cannot have a body").into());
            }
            let body = self.body_text();
            if body.is_empty() {
                return Err(MetaError::MissingPlan {
                    kind: "virtual procedure",
                    name,
                });
            }
            procedure.is_virtual = true;
            procedure.query_plan = Some(canonical_procedure(&body));
        } else if declared_virtual == Some(true) {
            return Err(MetaError::MissingPlan {
                kind: "virtual procedure",
                name,
            });
        }
        let is_virtual = procedure.is_virtual;
        self.factory.add_procedure(procedure)?;
        debug!(model = %self.factory.model_name(), procedure = %name, is_virtual, "ddl procedure applied");
        Ok(())
    }

    fn function(&mut self, is_virtual: bool) -> Result<()> {
        let name = self.ts.parse_qualified_name()?;
        self.ts.expect_token(&Token::LParen)?;
        let mut inputs = Vec::new();
        if !self.ts.consume_token(&Token::RParen) {
            loop {
                let param_name = self.ts.parse_identifier()?;
                let spec = self.type_spec()?;
                let vararg = self.ts.consume_keyword("VARARG");
                inputs.push(FunctionParameter {
                    name: param_name,
                    datatype: spec.datatype.name,
                    vararg,
                });
                if self.ts.consume_token(&Token::RParen) {
                    break;
                }
                self.ts.expect_token(&Token::Comma)?;
            }
        }
        self.ts.expect_keyword("RETURNS")?;
        let output = FunctionParameter {
            name: "return".into(),
            datatype: self.type_spec()?.datatype.name,
            vararg: false,
        };
        let mut function = FunctionMethod {
            name: name.clone(),
            uuid: fedq_core::id::generate_record_uuid(),
            name_in_source: None,
            inputs,
            output,
            pushdown: if is_virtual {
                crate::model::PushDown::CanPushdown
            } else {
                crate::model::PushDown::MustPushdown
            },
            determinism: Determinism::Deterministic,
            category: None,
            null_on_null: false,
            invocation_class: None,
            invocation_method: None,
            annotation: None,
            properties: Properties::new(),
        };
        if self.ts.peek_keyword("OPTIONS") {
            for (key, value) in self.options()? {
                match key.to_ascii_uppercase().as_str() {
                    "UUID" => function.uuid = value,
                    "NAMEINSOURCE" => function.name_in_source = Some(value),
                    "ANNOTATION" => function.annotation = Some(value),
                    "CATEGORY" => function.category = Some(value),
                    "NULLONNULL" => function.null_on_null = is_true(&value),
                    "JAVA_CLASS" => function.invocation_class = Some(value),
                    "JAVA_METHOD" => function.invocation_method = Some(value),
                    "DETERMINISTIC" => {
                        function.determinism = Determinism::parse(&value).unwrap_or(
                            if is_true(&value) {
                                Determinism::Deterministic
                            } else {
                                Determinism::Nondeterministic
                            },
                        )
                    }
                    _ => {
                        function.properties.insert(key, value);
                    }
                }
            }
        }
        if self.ts.consume_keyword("AS") {
            let _ = self.body_text();
        }
        self.factory.add_function(function)?;
        debug!(model = %self.factory.model_name(), function = %name, "ddl function applied");
        Ok(())
    }

    fn trigger(&mut self) -> Result<()> {
        self.ts.expect_keyword("ON")?;
        let target = self.ts.parse_qualified_name()?;
        self.ts.expect_keyword("INSTEAD")?;
        self.ts.expect_keyword("OF")?;
        let event = if self.ts.consume_keyword("INSERT") {
            "INSERT"
        } else if self.ts.consume_keyword("UPDATE") {
            "UPDATE"
        } else {
            self.ts.expect_keyword("DELETE")?;
            "DELETE"
        };
        self.ts.expect_keyword("AS")?;
        let body = self.body_text();
        if body.is_empty() {
            return Err(MetaError::MissingPlan {
                kind: "trigger",
                name: target,
            });
        }
        let plan = canonical_trigger(&body);
        let table = self.factory.table_mut(&target)?;
        if !table.is_virtual() {
            return Err(MetaError::resolve(format!(
                "INSTEAD OF trigger target '{}' is not a view",
                target
            )));
        }
        match event {
            "INSERT" => table.insert_plan = Some(plan),
            "UPDATE" => table.update_plan = Some(plan),
            _ => table.delete_plan = Some(plan),
        }
        table.supports_update = true;
        debug!(model = %self.factory.model_name(), table = %target, event, "ddl trigger applied");
        Ok(())
    }

    // ----- shared pieces -----

    fn options(&mut self) -> Result<Vec<(String, String)>> {
        self.ts.expect_keyword("OPTIONS")?;
        self.ts.expect_token(&Token::LParen)?;
        let mut out = Vec::new();
        if self.ts.consume_token(&Token::RParen) {
            return Ok(out);
        }
        loop {
            let key = self.ts.parse_qualified_name()?;
            let value = self.literal()?;
            out.push((key, value));
            if self.ts.consume_token(&Token::RParen) {
                return Ok(out);
            }
            self.ts.expect_token(&Token::Comma)?;
        }
    }

    /// A string, number or bare word, as text.
    fn literal(&mut self) -> Result<String> {
        let negative = self.ts.consume_token(&Token::Minus);
        match self.ts.next_token() {
            Some(Token::SingleQuotedString(s)) if !negative => Ok(s),
            Some(Token::Number(n, _)) if negative => Ok(format!("-{}", n)),
            Some(Token::Number(n, _)) => Ok(n),
            Some(Token::Word(w)) if !negative => Ok(w.value),
            _ => Err(self.ts.error("expected a literal value").into()),
        }
    }

    /// Raw text of a body up to the terminating `;` (consumed) or the next
    /// top-level `CREATE`. `BEGIN`/`CASE` ... `END` nesting is respected.
    fn body_text(&mut self) -> String {
        let start = self.ts.position();
        let mut blocks = 0i32;
        let mut parens = 0i32;
        loop {
            match self.ts.peek() {
                None => break,
                Some(Token::SemiColon) if blocks <= 0 && parens <= 0 => break,
                Some(Token::LParen) => parens += 1,
                Some(Token::RParen) => parens -= 1,
                Some(Token::Word(w)) if w.quote_style.is_none() => {
                    match w.value.to_ascii_uppercase().as_str() {
                        "BEGIN" | "CASE" => blocks += 1,
                        "END" => blocks -= 1,
                        "CREATE"
                            if blocks <= 0 && parens <= 0 && self.ts.position() > start =>
                        {
                            break
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            self.ts.next_token();
        }
        let text = self.ts.text_range(start, self.ts.position());
        self.ts.consume_token(&Token::SemiColon);
        text.trim().to_string()
    }
}

fn is_true(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "y"
    )
}

fn apply_table_option(table: &mut Table, key: String, value: String) {
    match key.to_ascii_uppercase().as_str() {
        "CARDINALITY" => table.cardinality = value.parse().unwrap_or(-1),
        "UUID" => table.uuid = value,
        "UPDATABLE" => table.supports_update = is_true(&value),
        "ANNOTATION" => table.annotation = Some(value),
        "NAMEINSOURCE" => table.name_in_source = Some(value),
        "MATERIALIZED" => table.materialized = is_true(&value),
        "MATERIALIZED_TABLE" => table.materialized_table_name = Some(value),
        _ => {
            table.properties.insert(key, value);
        }
    }
}

fn apply_column_option(column: &mut Column, key: String, value: String) {
    match key.to_ascii_uppercase().as_str() {
        "UUID" => column.uuid = value,
        "NAMEINSOURCE" => column.name_in_source = Some(value),
        "SELECTABLE" => column.selectable = is_true(&value),
        "UPDATABLE" => column.updatable = is_true(&value),
        "ANNOTATION" => column.annotation = Some(value),
        "NATIVE_TYPE" => column.native_type = Some(value),
        _ => {
            column.properties.insert(key, value);
        }
    }
}

/// Canonical SQL for a view body when it parses, otherwise the text as given.
fn canonical_query(body: &str) -> String {
    match QueryParser::parse_command(body) {
        Ok(command @ Command::Query(_)) => command.to_string(),
        _ => body.to_string(),
    }
}

fn canonical_procedure(body: &str) -> String {
    match QueryParser::parse_command(body) {
        Ok(command @ Command::CreateProcedure(_)) => command.to_string(),
        Ok(Command::Block(block)) => Command::CreateProcedure(CreateProcedure { block }).to_string(),
        Ok(statement) => Command::CreateProcedure(CreateProcedure {
            block: Block {
                atomic: false,
                statements: vec![statement],
            },
        })
        .to_string(),
        Err(_) => {
            let starts_with_begin = body
                .split_whitespace()
                .next()
                .is_some_and(|w| w.eq_ignore_ascii_case("BEGIN"));
            if starts_with_begin {
                format!("CREATE VIRTUAL PROCEDURE {}", body)
            } else {
                format!("CREATE VIRTUAL PROCEDURE BEGIN\n{};\nEND", body)
            }
        }
    }
}

fn canonical_trigger(body: &str) -> String {
    match QueryParser::parse_command(body) {
        Ok(command @ Command::TriggerAction(_)) => command.to_string(),
        Ok(Command::Block(block)) => Command::TriggerAction(TriggerAction { block }).to_string(),
        _ => body.to_string(),
    }
}
