//! DC-003: Loading declaration files.
//!
//! Parses text with the grammar, then lowers the syntax tree into a
//! [`DeclarationRecord`], enforcing the structural rules:
//! - exactly one `provider "<name>"` block with a string `region`
//! - `resource "<type>" "<name>"` blocks with identifier labels
//! - logical names unique across the file, attribute names unique per block
//! - every called function known to the registry, with a fitting arity
//!
//! Loading is pure: the same text always yields an equal record.

use super::functions::{CallError, FunctionRegistry};
use super::grammar::{self, Located, Mark, SyntaxAttribute, SyntaxBlock, SyntaxExpr, SyntaxNode};
use super::types::*;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// Loader settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Functions that may be called from attribute expressions
    pub functions: FunctionRegistry,
}

/// Parse declaration text with the built-in function table.
pub fn load(source: &str) -> Result<DeclarationRecord, LoadError> {
    load_with(source, &LoadOptions::default())
}

/// Parse declaration text with caller-supplied options.
pub fn load_with(source: &str, options: &LoadOptions) -> Result<DeclarationRecord, LoadError> {
    let file = grammar::parse_file(source).map_err(|e| {
        let (line, column) = e.at.line_col(source);
        LoadError::Syntax {
            line,
            column,
            message: e.message,
        }
    })?;

    let lowering = Lowering {
        source,
        functions: &options.functions,
    };
    let record = lowering.lower_file(file.blocks)?;
    tracing::debug!(
        provider = %record.provider.name,
        region = %record.provider.region,
        resources = record.resources.len(),
        "loaded declaration record"
    );
    Ok(record)
}

/// Read and parse a declaration file from disk.
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<DeclarationRecord, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "read declaration file");
    load_with(&content, options)
}

struct Lowering<'s> {
    source: &'s str,
    functions: &'s FunctionRegistry,
}

impl Lowering<'_> {
    fn lower_file(&self, blocks: Vec<SyntaxBlock>) -> Result<DeclarationRecord, LoadError> {
        let mut provider: Option<(ProviderConfig, Mark)> = None;
        let mut resources = Vec::new();
        let mut seen_names: HashMap<String, Mark> = HashMap::new();

        for block in blocks {
            match block.kind.value.as_str() {
                "provider" => {
                    let at = block.kind.at;
                    if let Some((existing, first)) = &provider {
                        return Err(LoadError::DuplicateName {
                            kind: NameKind::Provider,
                            name: existing.name.clone(),
                            line: self.line(at),
                            first_line: self.line(*first),
                        });
                    }
                    provider = Some((self.lower_provider(block)?, at));
                }
                "resource" => {
                    let resource = self.lower_resource(block, &mut seen_names)?;
                    resources.push(resource);
                }
                other => {
                    return Err(self.syntax(
                        block.kind.at,
                        format!(
                            "unsupported block type '{}' (expected 'provider' or 'resource')",
                            other
                        ),
                    ));
                }
            }
        }

        let Some((provider, _)) = provider else {
            return Err(self.syntax(Mark::end(), "missing provider block".to_string()));
        };
        Ok(DeclarationRecord {
            provider,
            resources,
        })
    }

    fn lower_provider(&self, block: SyntaxBlock) -> Result<ProviderConfig, LoadError> {
        let [name] = self.labels::<1>(&block, "provider")?;
        let mut attributes = self.lower_body(block.body)?;

        let region = match attributes.shift_remove("region") {
            Some(Expression::Literal(Literal::String(region))) if !region.is_empty() => region,
            Some(_) => {
                return Err(self.syntax(
                    block.kind.at,
                    format!("provider '{}' region must be a non-empty string", name),
                ))
            }
            None => {
                return Err(self.syntax(
                    block.kind.at,
                    format!("provider '{}' is missing required attribute 'region'", name),
                ))
            }
        };

        Ok(ProviderConfig {
            name,
            region,
            attributes,
        })
    }

    fn lower_resource(
        &self,
        block: SyntaxBlock,
        seen_names: &mut HashMap<String, Mark>,
    ) -> Result<ResourceDeclaration, LoadError> {
        let name_at = block.labels.get(1).map_or(block.kind.at, |l| l.at);
        let [resource_type, logical_name] = self.labels::<2>(&block, "resource")?;

        if let Some(first) = seen_names.get(&logical_name) {
            return Err(LoadError::DuplicateName {
                kind: NameKind::Resource,
                name: logical_name,
                line: self.line(name_at),
                first_line: self.line(*first),
            });
        }
        seen_names.insert(logical_name.clone(), name_at);

        Ok(ResourceDeclaration {
            resource_type,
            logical_name,
            attributes: self.lower_body(block.body)?,
        })
    }

    /// Check a block's label count and that every label is an identifier.
    fn labels<const N: usize>(
        &self,
        block: &SyntaxBlock,
        kind: &str,
    ) -> Result<[String; N], LoadError> {
        if block.labels.len() != N {
            return Err(self.syntax(
                block.kind.at,
                format!(
                    "{} block takes {} label(s), found {}",
                    kind,
                    N,
                    block.labels.len()
                ),
            ));
        }
        for label in &block.labels {
            if !grammar::is_identifier(&label.value) {
                return Err(self.syntax(
                    label.at,
                    format!("invalid identifier \"{}\" in {} block label", label.value, kind),
                ));
            }
        }
        let labels: Vec<String> = block.labels.iter().map(|l| l.value.clone()).collect();
        labels.try_into().map_err(|_| {
            self.syntax(block.kind.at, format!("{} block label mismatch", kind))
        })
    }

    fn lower_body(
        &self,
        body: Vec<SyntaxAttribute>,
    ) -> Result<IndexMap<String, Expression>, LoadError> {
        let mut attributes = IndexMap::new();
        let mut first_seen: HashMap<String, Mark> = HashMap::new();
        for attr in body {
            self.check_unique(&attr.name, &mut first_seen)?;
            attributes.insert(attr.name.value, self.lower_expr(attr.value)?);
        }
        Ok(attributes)
    }

    fn check_unique(
        &self,
        key: &Located<String>,
        first_seen: &mut HashMap<String, Mark>,
    ) -> Result<(), LoadError> {
        if let Some(first) = first_seen.get(&key.value) {
            return Err(LoadError::DuplicateName {
                kind: NameKind::Attribute,
                name: key.value.clone(),
                line: self.line(key.at),
                first_line: self.line(*first),
            });
        }
        first_seen.insert(key.value.clone(), key.at);
        Ok(())
    }

    fn lower_expr(&self, expr: SyntaxExpr) -> Result<Expression, LoadError> {
        match expr.node {
            SyntaxNode::Literal(lit) => Ok(Expression::Literal(lit)),
            SyntaxNode::Reference(path) => Ok(Expression::Reference(Reference { path })),
            SyntaxNode::Call { name, args } => {
                let (line, column) = expr.at.line_col(self.source);
                match self.functions.check_call(&name, args.len()) {
                    Ok(_) => {}
                    Err(CallError::Unknown) => {
                        return Err(LoadError::UnknownFunction { name, line, column })
                    }
                    Err(CallError::Arity(arity)) => {
                        return Err(LoadError::Arity {
                            name,
                            expected: arity.to_string(),
                            found: args.len(),
                            line,
                            column,
                        })
                    }
                }
                let args = args
                    .into_iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expression::Call(FunctionCall { name, args }))
            }
            SyntaxNode::List(items) => Ok(Expression::List(
                items
                    .into_iter()
                    .map(|i| self.lower_expr(i))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            SyntaxNode::Object(entries) => {
                let mut out = IndexMap::new();
                let mut first_seen = HashMap::new();
                for (key, value) in entries {
                    self.check_unique(&key, &mut first_seen)?;
                    out.insert(key.value, self.lower_expr(value)?);
                }
                Ok(Expression::Object(out))
            }
        }
    }

    fn line(&self, at: Mark) -> usize {
        at.line_col(self.source).0
    }

    fn syntax(&self, at: Mark, message: String) -> LoadError {
        let (line, column) = at.line_col(self.source);
        LoadError::Syntax {
            line,
            column,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::{Arity, FunctionSignature};

    const FIXTURE: &str = r#"provider "aws" {
  region = "us-west-2"
}

resource "aws_datapipeline_pipeline" "test_pipeline" {
  name = uuid()
}
"#;

    fn syntax_message(src: &str) -> String {
        match load(src) {
            Err(LoadError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_dc003_fixture() {
        let record = load(FIXTURE).unwrap();
        assert_eq!(record.provider().name, "aws");
        assert_eq!(record.provider().region, "us-west-2");
        assert!(record.provider().attributes.is_empty());

        let resources: Vec<_> = record.resources().collect();
        assert_eq!(resources.len(), 1);
        let r = resources[0];
        assert_eq!(r.resource_type, "aws_datapipeline_pipeline");
        assert_eq!(r.kind(), "datapipeline_pipeline");
        assert_eq!(r.logical_name, "test_pipeline");

        let call = r.attribute("name").and_then(Expression::as_call).unwrap();
        assert_eq!(call.name, "uuid");
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_dc003_deterministic() {
        assert_eq!(load(FIXTURE).unwrap(), load(FIXTURE).unwrap());
    }

    #[test]
    fn test_dc003_from_str() {
        let record: DeclarationRecord = FIXTURE.parse().unwrap();
        assert_eq!(record.len(), 1);
        assert!(record.resource("test_pipeline").is_some());
        assert!(record.resource("other").is_none());
    }

    #[test]
    fn test_dc003_resources_restartable() {
        let record = load(FIXTURE).unwrap();
        let iter = record.resources();
        assert_eq!(iter.clone().count(), 1);
        assert_eq!(iter.count(), 1);
        assert_eq!(record.resources().count(), 1);
    }

    #[test]
    fn test_dc003_empty_is_syntax_error() {
        assert!(syntax_message("").contains("missing provider block"));
        assert!(syntax_message("\n# nothing here\n").contains("missing provider block"));
    }

    #[test]
    fn test_dc003_resources_without_provider() {
        let src = "resource \"aws_s3_bucket\" \"b\" {\n  bucket = \"x\"\n}\n";
        assert!(syntax_message(src).contains("missing provider block"));
    }

    #[test]
    fn test_dc003_duplicate_logical_name() {
        let src = format!(
            "{}\nresource \"aws_datapipeline_pipeline\" \"test_pipeline\" {{\n  name = uuid()\n}}\n",
            FIXTURE
        );
        match load(&src) {
            Err(LoadError::DuplicateName {
                kind,
                name,
                line,
                first_line,
            }) => {
                assert_eq!(kind, NameKind::Resource);
                assert_eq!(name, "test_pipeline");
                assert_eq!(first_line, 5);
                assert_eq!(line, 9);
            }
            other => panic!("expected duplicate name, got {:?}", other),
        }
    }

    #[test]
    fn test_dc003_duplicate_name_across_types() {
        let src = format!(
            "{}\nresource \"aws_s3_bucket\" \"test_pipeline\" {{}}\n",
            FIXTURE
        );
        assert!(matches!(
            load(&src),
            Err(LoadError::DuplicateName {
                kind: NameKind::Resource,
                ..
            })
        ));
    }

    #[test]
    fn test_dc003_duplicate_provider() {
        let src = format!("{}\nprovider \"aws\" {{\n  region = \"eu-west-1\"\n}}\n", FIXTURE);
        assert!(matches!(
            load(&src),
            Err(LoadError::DuplicateName {
                kind: NameKind::Provider,
                ..
            })
        ));
    }

    #[test]
    fn test_dc003_duplicate_attribute() {
        let src = "provider \"aws\" {\n  region = \"us-west-2\"\n  region = \"us-east-1\"\n}\n";
        match load(src) {
            Err(LoadError::DuplicateName {
                kind,
                line,
                first_line,
                ..
            }) => {
                assert_eq!(kind, NameKind::Attribute);
                assert_eq!((line, first_line), (3, 2));
            }
            other => panic!("expected duplicate attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_dc003_duplicate_object_key() {
        let src = format!(
            "{}\nresource \"aws_s3_bucket\" \"b\" {{\n  tags = {{ a = 1, a = 2 }}\n}}\n",
            FIXTURE
        );
        assert!(matches!(
            load(&src),
            Err(LoadError::DuplicateName {
                kind: NameKind::Attribute,
                ..
            })
        ));
    }

    #[test]
    fn test_dc003_unknown_function() {
        let src = FIXTURE.replace("uuid()", "uuidv7()");
        match load(&src) {
            Err(LoadError::UnknownFunction { name, line, column }) => {
                assert_eq!(name, "uuidv7");
                assert_eq!((line, column), (6, 10));
            }
            other => panic!("expected unknown function, got {:?}", other),
        }
    }

    #[test]
    fn test_dc003_unknown_nested_function() {
        let src = FIXTURE.replace("uuid()", "lower(shout(\"x\"))");
        assert!(matches!(
            load(&src),
            Err(LoadError::UnknownFunction { ref name, .. }) if name == "shout"
        ));
    }

    #[test]
    fn test_dc003_arity_mismatch() {
        let src = FIXTURE.replace("uuid()", "uuid(\"seed\")");
        match load(&src) {
            Err(LoadError::Arity {
                name,
                expected,
                found,
                ..
            }) => {
                assert_eq!(name, "uuid");
                assert_eq!(expected, "0");
                assert_eq!(found, 1);
            }
            other => panic!("expected arity error, got {:?}", other),
        }
    }

    #[test]
    fn test_dc003_custom_registry() {
        let src = FIXTURE.replace("uuid()", "md5(\"x\")");
        assert!(load(&src).is_err());

        let mut options = LoadOptions::default();
        options
            .functions
            .register(FunctionSignature::new("md5", Arity::Exact(1), false));
        let record = load_with(&src, &options).unwrap();
        let call = record.resources().next().unwrap().attributes["name"]
            .as_call()
            .unwrap();
        assert_eq!(call.name, "md5");
        assert_eq!(call.args, vec![Expression::string("x")]);
    }

    #[test]
    fn test_dc003_unsupported_block() {
        let src = format!("variable \"region\" {{}}\n{}", FIXTURE);
        assert!(syntax_message(&src).contains("unsupported block type 'variable'"));
    }

    #[test]
    fn test_dc003_label_count() {
        assert!(syntax_message("provider {\n  region = \"x\"\n}\n").contains("takes 1 label"));
        let src = format!("{}\nresource \"aws_s3_bucket\" {{}}\n", FIXTURE);
        assert!(syntax_message(&src).contains("takes 2 label"));
    }

    #[test]
    fn test_dc003_invalid_identifier_label() {
        let src = FIXTURE.replace("\"test_pipeline\"", "\"9 lives\"");
        match load(&src) {
            Err(LoadError::Syntax {
                line,
                column,
                message,
            }) => {
                assert!(message.contains("invalid identifier"), "{}", message);
                assert_eq!((line, column), (5, 38));
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_dc003_region_rules() {
        assert!(syntax_message("provider \"aws\" {\n  profile = \"dev\"\n}\n")
            .contains("missing required attribute 'region'"));
        assert!(syntax_message("provider \"aws\" {\n  region = var.region\n}\n")
            .contains("non-empty string"));
        assert!(syntax_message("provider \"aws\" {\n  region = \"\"\n}\n")
            .contains("non-empty string"));
    }

    #[test]
    fn test_dc003_provider_extra_attributes() {
        let src = "provider \"aws\" {\n  profile = \"dev\"\n  region  = \"eu-central-1\"\n  max_retries = 3\n}\n";
        let record = load(src).unwrap();
        let keys: Vec<_> = record.provider().attributes.keys().collect();
        assert_eq!(keys, vec!["profile", "max_retries"]);
        assert_eq!(record.provider().region, "eu-central-1");
        assert!(record.is_empty());
    }

    #[test]
    fn test_dc003_unbalanced_block() {
        let src = FIXTURE.trim_end().trim_end_matches('}');
        let err = load(src).unwrap_err();
        assert!(matches!(err, LoadError::Syntax { .. }));
        assert!(err.to_string().contains("'}' to close block"), "{}", err);
    }

    #[test]
    fn test_dc003_deep_nesting_is_syntax_error() {
        for open in ["[", "{ k = ", "lower("] {
            let close = match open {
                "[" => "]",
                "lower(" => ")",
                _ => " }",
            };
            let value = format!("{}1{}", open.repeat(10_000), close.repeat(10_000));
            let src = FIXTURE.replace("uuid()", &value);
            match load(&src) {
                Err(LoadError::Syntax { line, message, .. }) => {
                    assert_eq!(line, 6);
                    assert!(message.contains("64 levels"), "{}", message);
                }
                other => panic!("expected syntax error, got {:?}", other.map(|_| ())),
            }
        }

        let value = format!("{}1{}", "[".repeat(63), "]".repeat(63));
        assert!(load(&FIXTURE.replace("uuid()", &value)).is_ok());
    }

    #[test]
    fn test_dc003_resources_in_file_order() {
        let src = format!(
            "{}\nresource \"aws_s3_bucket\" \"zeta\" {{}}\n\nresource \"aws_s3_bucket\" \"alpha\" {{}}\n",
            FIXTURE
        );
        let record = load(&src).unwrap();
        let names: Vec<_> = record.resources().map(|r| r.logical_name.as_str()).collect();
        assert_eq!(names, vec!["test_pipeline", "zeta", "alpha"]);
    }

    #[test]
    fn test_dc003_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf");
        std::fs::write(&path, FIXTURE).unwrap();
        let record = load_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(record.provider().region, "us-west-2");
    }

    #[test]
    fn test_dc003_load_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("ghost.tf"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_dc003_concurrent_loads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeclarationRecord>();

        let expected = load(FIXTURE).unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| load(FIXTURE).unwrap())).collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
    }
}
