//! Canonical schema text generation.
//!
//! [`generate`] is deterministic and best-effort: it always produces text,
//! and returns `false` alongside it when the schema had an issue (a relation
//! missing allowed types, a `_this` leaf inside a rewrite, an undecodable
//! caveat expression). Issues are also marked in the text itself with a
//! visible comment token, so the output never silently drops anything.

use crate::schema::{
    AllowedRelation, AllowedTarget, CaveatDefinition, CaveatEngine, NamespaceDefinition,
    RewriteChild, SchemaDefinition, SetOperator, UsersetRewrite,
};

const INDENT: &str = "\t";
const SINGLE_LINE_COMMENT_LIMIT: usize = 70;

const MISSING_ALLOWED_TYPES: &str = "/* missing allowed types */";
const UNSUPPORTED_THIS: &str =
    "/* _this unsupported here. Please rewrite into a relation and permission */";
const UNDECODABLE_EXPRESSION: &str = "/* unable to decode caveat expression */";

/// Emits canonical schema text for the given definitions, in order.
///
/// Returns the text and an ok-flag: `false` means the output carries at
/// least one visible issue token and would not round-trip cleanly.
pub fn generate(definitions: &[SchemaDefinition], caveats: &dyn CaveatEngine) -> (String, bool) {
    let mut ok = true;
    let blocks: Vec<String> = definitions
        .iter()
        .map(|definition| {
            let mut generator = Generator::new(caveats);
            match definition {
                SchemaDefinition::Namespace(namespace) => generator.emit_namespace(namespace),
                SchemaDefinition::Caveat(caveat) => generator.emit_caveat(caveat),
            }
            ok &= generator.ok;
            generator.out
        })
        .collect();
    (blocks.join("\n\n"), ok)
}

struct Generator<'a> {
    out: String,
    ok: bool,
    caveats: &'a dyn CaveatEngine,
}

impl<'a> Generator<'a> {
    fn new(caveats: &'a dyn CaveatEngine) -> Self {
        Self {
            out: String::new(),
            ok: true,
            caveats,
        }
    }

    fn push_line(&mut self, indent: usize, line: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        if !line.is_empty() {
            for _ in 0..indent {
                self.out.push_str(INDENT);
            }
            self.out.push_str(line);
        }
    }

    fn emit_comments(&mut self, comments: &[String], indent: usize, at_scope_start: bool) {
        if comments.is_empty() {
            return;
        }
        if !at_scope_start {
            self.push_line(0, "");
        }
        for comment in comments {
            for line in normalize_comment(comment) {
                self.push_line(indent, &line);
            }
        }
    }

    fn emit_namespace(&mut self, namespace: &NamespaceDefinition) {
        self.emit_comments(&namespace.metadata.comments, 0, true);

        if namespace.relations.is_empty() {
            self.push_line(0, &format!("definition {} {{}}", namespace.name));
            return;
        }

        self.push_line(0, &format!("definition {} {{", namespace.name));
        for (index, relation) in namespace.relations.iter().enumerate() {
            self.emit_comments(&relation.metadata.comments, 1, index == 0);

            let line = match &relation.rewrite {
                Some(rewrite) if relation.is_permission() => {
                    format!("permission {} = {}", relation.name, self.render_rewrite(rewrite))
                }
                rewrite => {
                    let types = if relation.allowed.is_empty() {
                        self.ok = false;
                        MISSING_ALLOWED_TYPES.to_string()
                    } else {
                        relation
                            .allowed
                            .iter()
                            .map(render_allowed)
                            .collect::<Vec<_>>()
                            .join(" | ")
                    };
                    match rewrite {
                        Some(rewrite) => format!(
                            "relation {}: {} = {}",
                            relation.name,
                            types,
                            self.render_rewrite(rewrite)
                        ),
                        None => format!("relation {}: {}", relation.name, types),
                    }
                }
            };
            self.push_line(1, &line);
        }
        self.push_line(0, "}");
    }

    fn emit_caveat(&mut self, caveat: &CaveatDefinition) {
        self.emit_comments(&caveat.metadata.comments, 0, true);

        let mut parameters: Vec<(&String, &String)> = caveat.parameters.iter().collect();
        parameters.sort_by(|(left, _), (right, _)| left.cmp(right));
        let parameters = parameters
            .iter()
            .map(|(name, type_name)| format!("{} {}", name, type_name))
            .collect::<Vec<_>>()
            .join(", ");

        self.push_line(0, &format!("caveat {}({}) {{", caveat.name, parameters));
        match self.caveats.deserialize(&caveat.expression) {
            Ok(expression) => {
                let text = expression.expr_string();
                for line in text.trim().lines() {
                    self.push_line(1, line.trim());
                }
            }
            Err(_) => {
                self.ok = false;
                self.push_line(1, UNDECODABLE_EXPRESSION);
            }
        }
        self.push_line(0, "}");
    }

    fn render_rewrite(&mut self, rewrite: &UsersetRewrite) -> String {
        let separator = format!(" {} ", rewrite.operator);
        rewrite
            .children
            .iter()
            .map(|child| self.render_child(rewrite.operator, child))
            .collect::<Vec<_>>()
            .join(&separator)
    }

    fn render_child(&mut self, parent: SetOperator, child: &RewriteChild) -> String {
        match child {
            RewriteChild::This => {
                self.ok = false;
                UNSUPPORTED_THIS.to_string()
            }
            RewriteChild::Nil => "nil".to_string(),
            RewriteChild::ComputedUserset(relation) => relation.clone(),
            RewriteChild::TupleToUserset { tupleset, computed } => {
                format!("{}->{}", tupleset, computed)
            }
            RewriteChild::Rewrite(nested) => {
                // Union-of-union nesting is associative and flattens cleanly.
                if parent == SetOperator::Union && nested.is_all_union() {
                    self.render_rewrite(nested)
                } else {
                    format!("({})", self.render_rewrite(nested))
                }
            }
        }
    }
}

fn render_allowed(allowed: &AllowedRelation) -> String {
    let base = match &allowed.target {
        AllowedTarget::Ellipsis => allowed.namespace.clone(),
        AllowedTarget::Relation(relation) => format!("{}#{}", allowed.namespace, relation),
        AllowedTarget::Wildcard => format!("{}:*", allowed.namespace),
    };
    match &allowed.required_caveat {
        Some(caveat) => format!("{} with {}", base, caveat),
        None => base,
    }
}

fn normalize_comment(comment: &str) -> Vec<String> {
    if let Some(rest) = comment.strip_prefix("//") {
        let content = rest.trim();
        return if content.is_empty() {
            vec!["//".to_string()]
        } else {
            vec![format!("// {}", content)]
        };
    }

    if comment.starts_with("/*") {
        let inner = comment
            .strip_prefix("/**")
            .or_else(|| comment.strip_prefix("/*"))
            .unwrap_or(comment);
        let inner = inner.strip_suffix("*/").unwrap_or(inner);
        let trimmed = inner.trim();

        if trimmed.chars().count() <= SINGLE_LINE_COMMENT_LIMIT && !trimmed.contains('\n') {
            return vec![format!("/* {} */", trimmed)];
        }

        let mut lines = vec!["/**".to_string()];
        for line in trimmed.lines() {
            let line = line.trim().trim_start_matches('*').trim_start();
            if line.is_empty() {
                lines.push(" *".to_string());
            } else {
                lines.push(format!(" * {}", line));
            }
        }
        lines.push(" */".to_string());
        return lines;
    }

    vec![format!("// {}", comment.trim())]
}
