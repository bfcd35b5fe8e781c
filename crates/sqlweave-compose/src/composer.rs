//! QueryComposer: template build and per-call render

use serde::Serialize;
use sqlweave_types::{ObjectAccessor, StructuralAccessor, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::binding::{extract_parameters, resolve_all, ParameterBinding, ParameterMapping};
use crate::error::{CompositionError, Result};
use crate::expression::Expression;
use crate::fragment::{qualify, substitute_properties, FragmentRegistry};
use crate::node::{ConditionalNode, LoopNode, RenderContext, StatementNode, TrimNode};
use crate::scope::VariableScope;
use crate::template::{parse_overrides, ForeachSpec, TemplateNode, TrimSpec};

/// Rendered SQL with `?` placeholders and the values bound to them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundStatement {
    pub sql: String,
    pub bindings: Vec<ParameterBinding>,
}

/// Per-call collaborators for a render
#[derive(Clone, Copy)]
pub struct RenderEnvironment<'a> {
    pub database_id: Option<&'a str>,
    pub accessor: &'a dyn ObjectAccessor,
}

impl Default for RenderEnvironment<'static> {
    fn default() -> Self {
        Self {
            database_id: None,
            accessor: &StructuralAccessor,
        }
    }
}

#[derive(Debug)]
enum Source {
    /// Rendered once at build time
    Static {
        sql: String,
        mappings: Vec<ParameterMapping>,
    },
    Dynamic,
}

/// One template, built once and rendered per invocation
#[derive(Debug)]
pub struct QueryComposer {
    root: StatementNode,
    source: Source,
}

impl QueryComposer {
    pub fn build(template: &TemplateNode) -> Result<Self> {
        Self::build_with(template, &FragmentRegistry::default(), None)
    }

    /// Build, resolving includes against `fragments` within `namespace`
    pub fn build_with(
        template: &TemplateNode,
        fragments: &FragmentRegistry,
        namespace: Option<&str>,
    ) -> Result<Self> {
        let mut compiler = Compiler {
            fragments,
            namespace,
            include_stack: Vec::new(),
        };
        let root = compiler.compile(template, &HashMap::new())?;
        Self::from_node(root)
    }

    pub fn from_node(root: StatementNode) -> Result<Self> {
        let source = if root.is_dynamic() {
            Source::Dynamic
        } else {
            let null = Value::Null;
            let mut ctx = RenderContext::new(VariableScope::new(&null, None, &StructuralAccessor));
            root.render(&mut ctx)?;
            let (sql, mappings) = extract_parameters(&ctx.finish().0)?;
            Source::Static { sql, mappings }
        };
        debug!(dynamic = matches!(source, Source::Dynamic), "built query composer");
        Ok(Self { root, source })
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.source, Source::Dynamic)
    }

    pub fn root(&self) -> &StatementNode {
        &self.root
    }

    pub fn render(&self, parameter: &Value) -> Result<BoundStatement> {
        self.render_in(parameter, &RenderEnvironment::default())
    }

    pub fn render_in(
        &self,
        parameter: &Value,
        env: &RenderEnvironment<'_>,
    ) -> Result<BoundStatement> {
        let scope = VariableScope::new(parameter, env.database_id, env.accessor);
        match &self.source {
            Source::Static { sql, mappings } => Ok(BoundStatement {
                sql: sql.clone(),
                bindings: resolve_all(mappings, &scope)?,
            }),
            Source::Dynamic => {
                let mut ctx = RenderContext::new(scope);
                self.root.render(&mut ctx)?;
                let (text, scope) = ctx.finish();
                let (sql, mappings) = extract_parameters(&text)?;
                let bindings = resolve_all(&mappings, &scope)?;
                Ok(BoundStatement { sql, bindings })
            }
        }
    }
}

// ============================================================================
// Template compilation
// ============================================================================

struct Compiler<'a> {
    fragments: &'a FragmentRegistry,
    namespace: Option<&'a str>,
    include_stack: Vec<String>,
}

type Properties = HashMap<String, String>;

impl Compiler<'_> {
    fn compile(&mut self, node: &TemplateNode, props: &Properties) -> Result<StatementNode> {
        let sub = |text: &str| substitute_properties(text, props);
        match node {
            TemplateNode::Text(text) => StatementNode::text(&sub(text)?),
            TemplateNode::If { test, body } => {
                let body = self.compile_all(body, props)?;
                StatementNode::conditional(&sub(test)?, body)
            }
            TemplateNode::Choose { when, otherwise } => {
                if otherwise.len() > 1 {
                    return Err(CompositionError::DuplicateOtherwise);
                }
                let branches = when
                    .iter()
                    .map(|(test, body)| {
                        Ok(ConditionalNode {
                            test: Expression::parse(&sub(test)?)?,
                            body: Box::new(self.compile_all(body, props)?),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let otherwise = match otherwise.first() {
                    Some(body) => Some(Box::new(self.compile_all(body, props)?)),
                    None => None,
                };
                Ok(StatementNode::ChooseFirst {
                    branches,
                    otherwise,
                })
            }
            TemplateNode::Foreach(spec) => self.compile_loop(spec, props),
            TemplateNode::Trim(spec) => self.compile_trim(spec, props),
            TemplateNode::Where(body) => {
                Ok(StatementNode::where_clause(self.compile_all(body, props)?))
            }
            TemplateNode::Set(body) => Ok(StatementNode::set_clause(self.compile_all(body, props)?)),
            TemplateNode::Bind { name, value } => StatementNode::var_decl(name.clone(), &sub(value)?),
            TemplateNode::Include { refid, properties } => {
                self.compile_include(&sub(refid)?, properties, props)
            }
            TemplateNode::Mixed(children) => self.compile_all(children, props),
        }
    }

    fn compile_all(&mut self, nodes: &[TemplateNode], props: &Properties) -> Result<StatementNode> {
        let children = nodes
            .iter()
            .map(|n| self.compile(n, props))
            .collect::<Result<Vec<_>>>()?;
        Ok(StatementNode::Group(children))
    }

    fn compile_loop(&mut self, spec: &ForeachSpec, props: &Properties) -> Result<StatementNode> {
        let sub_opt = |text: &Option<String>| -> Result<Option<String>> {
            text.as_deref()
                .map(|t| substitute_properties(t, props))
                .transpose()
        };
        Ok(StatementNode::Loop(LoopNode {
            collection: Expression::parse(&substitute_properties(&spec.collection, props)?)?,
            item: spec.item.clone(),
            index: spec.index.clone(),
            open: sub_opt(&spec.open)?,
            close: sub_opt(&spec.close)?,
            separator: sub_opt(&spec.separator)?,
            body: Box::new(self.compile_all(&spec.body, props)?),
        }))
    }

    fn compile_trim(&mut self, spec: &TrimSpec, props: &Properties) -> Result<StatementNode> {
        Ok(StatementNode::TrimmedGroup(TrimNode {
            prefix: spec.prefix.clone(),
            prefix_overrides: parse_overrides(spec.prefix_overrides.as_deref()),
            suffix: spec.suffix.clone(),
            suffix_overrides: parse_overrides(spec.suffix_overrides.as_deref()),
            body: Box::new(self.compile_all(&spec.body, props)?),
        }))
    }

    fn compile_include(
        &mut self,
        refid: &str,
        declared: &[(String, String)],
        inherited: &Properties,
    ) -> Result<StatementNode> {
        let id = qualify(refid, self.namespace);
        if self.include_stack.contains(&id) {
            let mut cycle = self.include_stack.clone();
            cycle.push(id);
            return Err(CompositionError::CircularInclude(cycle));
        }
        let fragments = self.fragments;
        let body = fragments
            .get(&id)
            .ok_or_else(|| CompositionError::UnknownFragment(id.clone()))?;

        let mut props = inherited.clone();
        let mut seen = Vec::with_capacity(declared.len());
        for (name, value) in declared {
            if seen.contains(&name) {
                return Err(CompositionError::DuplicateIncludeProperty { name: name.clone() });
            }
            seen.push(name);
            props.insert(name.clone(), substitute_properties(value, inherited)?);
        }

        debug!(fragment = %id, depth = self.include_stack.len(), "expanding include");
        self.include_stack.push(id);
        let result = self.compile_all(body, &props);
        self.include_stack.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateNode as T;
    use pretty_assertions::assert_eq;

    fn binding(name: &str, value: impl Into<Value>, position: usize) -> ParameterBinding {
        ParameterBinding {
            name: name.to_string(),
            value: value.into(),
            position,
            mode: Default::default(),
            jdbc_type: None,
        }
    }

    fn where_name() -> TemplateNode {
        T::Mixed(vec![
            T::text("SELECT * FROM t"),
            T::Where(vec![T::if_test("name != null", vec![T::text("AND name = #{name}")])]),
        ])
    }

    #[test]
    fn test_optional_where_clause() {
        let composer = QueryComposer::build(&where_name()).unwrap();
        assert!(composer.is_dynamic());

        let out = composer.render(&Value::map([("name", Value::Null)])).unwrap();
        assert_eq!(out.sql, "SELECT * FROM t");
        assert!(out.bindings.is_empty());

        let out = composer.render(&Value::map([("name", "a")])).unwrap();
        assert_eq!(out.sql, "SELECT * FROM t WHERE name = ?");
        assert_eq!(out.bindings, vec![binding("name", "a", 0)]);
    }

    #[test]
    fn test_static_template_renders_identically() {
        let composer = QueryComposer::build(&T::Mixed(vec![
            T::text("SELECT * FROM users"),
            T::text("WHERE id = #{id}"),
        ]))
        .unwrap();
        assert!(!composer.is_dynamic());

        let a = composer.render(&Value::from(1)).unwrap();
        let b = composer.render(&Value::map([("id", 2)])).unwrap();
        assert_eq!(a.sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(a.sql, b.sql);
        assert_eq!(a.bindings, vec![binding("id", 1, 0)]);
        assert_eq!(b.bindings, vec![binding("id", 2, 0)]);
    }

    #[test]
    fn test_foreach_in_clause() {
        let template = T::Mixed(vec![
            T::text("SELECT * FROM t WHERE id IN"),
            ForeachSpec::new("ids", "id")
                .open("(")
                .close(")")
                .separator(",")
                .body(vec![T::text("#{id}")])
                .into(),
        ]);
        let composer = QueryComposer::build(&template).unwrap();
        let out = composer.render(&Value::map([("ids", vec![3, 4])])).unwrap();
        assert_eq!(out.sql, "SELECT * FROM t WHERE id IN (?,?)");
        assert_eq!(
            out.bindings,
            vec![binding("__frch_id_0", 3, 0), binding("__frch_id_1", 4, 1)]
        );
    }

    #[test]
    fn test_bound_statement_serializes() {
        let template = T::text("SELECT * FROM t WHERE id = #{id,jdbcType=INTEGER}");
        let composer = QueryComposer::build(&template).unwrap();
        let out = composer.render(&Value::map([("id", 7)])).unwrap();
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            serde_json::json!({
                "sql": "SELECT * FROM t WHERE id = ?",
                "bindings": [
                    {"name": "id", "value": 7, "position": 0, "mode": "IN", "jdbc_type": "INTEGER"}
                ]
            })
        );
    }

    #[test]
    fn test_foreach_over_records_with_index() {
        let template = T::Mixed(vec![
            T::text("INSERT INTO t (pos, name) VALUES"),
            ForeachSpec::new("list", "u")
                .index("i")
                .separator(",")
                .body(vec![T::text("(#{i}, #{u.name})")])
                .into(),
        ]);
        let composer = QueryComposer::build(&template).unwrap();
        let param = Value::from(vec![Value::map([("name", "a")]), Value::map([("name", "b")])]);
        let out = composer.render(&param).unwrap();
        assert_eq!(out.sql, "INSERT INTO t (pos, name) VALUES (?, ?),(?, ?)");
        let values: Vec<_> = out.bindings.iter().map(|b| b.value.clone()).collect();
        assert_eq!(
            values,
            vec![Value::Int(0), Value::from("a"), Value::Int(1), Value::from("b")]
        );
    }

    #[test]
    fn test_null_collection_fails_and_composer_stays_usable() {
        let template: TemplateNode = ForeachSpec::new("ids", "id").body(vec![T::text("#{id}")]).into();
        let composer = QueryComposer::build(&template).unwrap();
        let err = composer.render(&Value::map([("ids", Value::Null)])).unwrap_err();
        assert!(matches!(err, CompositionError::NullIterable { .. }));
        assert!(composer.render(&Value::map([("ids", vec![1])])).is_ok());
    }

    #[test]
    fn test_choose_with_otherwise() {
        let template = T::Mixed(vec![
            T::text("SELECT * FROM t WHERE"),
            T::Choose {
                when: vec![
                    ("id != null".into(), vec![T::text("id = #{id}")]),
                    ("name != null".into(), vec![T::text("name = #{name}")]),
                ],
                otherwise: vec![vec![T::text("1 = 1")]],
            },
        ]);
        let composer = QueryComposer::build(&template).unwrap();
        assert_eq!(
            composer.render(&Value::map([("name", "n")])).unwrap().sql,
            "SELECT * FROM t WHERE name = ?"
        );
        assert_eq!(
            composer.render(&Value::Null).unwrap().sql,
            "SELECT * FROM t WHERE 1 = 1"
        );
    }

    #[test]
    fn test_duplicate_otherwise_is_rejected() {
        let template = T::Choose {
            when: vec![],
            otherwise: vec![vec![T::text("a")], vec![T::text("b")]],
        };
        assert_eq!(
            QueryComposer::build(&template).unwrap_err(),
            CompositionError::DuplicateOtherwise
        );
    }

    #[test]
    fn test_bind_then_bound_parameter() {
        let template = T::Mixed(vec![
            T::bind("pattern", "'%' + name + '%'"),
            T::text("SELECT * FROM t WHERE name LIKE #{pattern}"),
        ]);
        let out = QueryComposer::build(&template)
            .unwrap()
            .render(&Value::map([("name", "bo")]))
            .unwrap();
        assert_eq!(out.bindings, vec![binding("pattern", "%bo%", 0)]);
    }

    #[test]
    fn test_set_clause() {
        let template = T::Mixed(vec![
            T::text("UPDATE t"),
            T::Set(vec![
                T::if_test("name != null", vec![T::text("name = #{name},")]),
                T::if_test("age != null", vec![T::text("age = #{age},")]),
            ]),
            T::text("WHERE id = #{id}"),
        ]);
        let out = QueryComposer::build(&template)
            .unwrap()
            .render(&Value::map([("name", Value::from("x")), ("id", Value::from(1))]))
            .unwrap();
        assert_eq!(out.sql, "UPDATE t SET name = ? WHERE id = ?");
    }

    #[test]
    fn test_trim_with_overrides() {
        let template = T::Mixed(vec![
            T::text("SELECT * FROM t"),
            TrimSpec::new(vec![T::if_test("a", vec![T::text("and a = 1")])])
                .prefix("WHERE")
                .prefix_overrides("AND |OR ")
                .into(),
        ]);
        let composer = QueryComposer::build(&template).unwrap();
        assert_eq!(
            composer.render(&Value::map([("a", true)])).unwrap().sql,
            "SELECT * FROM t WHERE a = 1"
        );
    }

    #[test]
    fn test_database_id_is_visible() {
        let template = T::Mixed(vec![
            T::if_test("_databaseId == 'pg'", vec![T::text("SELECT now()")]),
            T::if_test("_databaseId != 'pg'", vec![T::text("SELECT sysdate")]),
        ]);
        let composer = QueryComposer::build(&template).unwrap();
        let env = RenderEnvironment {
            database_id: Some("pg"),
            ..RenderEnvironment::default()
        };
        assert_eq!(composer.render_in(&Value::Null, &env).unwrap().sql, "SELECT now()");
        assert_eq!(composer.render(&Value::Null).unwrap().sql, "SELECT sysdate");
    }

    #[test]
    fn test_include_with_properties() {
        let mut fragments = FragmentRegistry::new();
        fragments.register(Some("user"), "cols", vec![T::text("${alias}.id, ${alias}.name")]);
        let template = T::Mixed(vec![
            T::text("SELECT"),
            T::include("cols").with_property("alias", "u"),
            T::text("FROM users u"),
        ]);
        let composer = QueryComposer::build_with(&template, &fragments, Some("user")).unwrap();
        assert!(!composer.is_dynamic());
        assert_eq!(
            composer.render(&Value::Null).unwrap().sql,
            "SELECT u.id, u.name FROM users u"
        );
    }

    #[test]
    fn test_nested_include_inherits_properties() {
        let mut fragments = FragmentRegistry::new();
        fragments.register(Some("ns"), "inner", vec![T::text("${table}")]);
        fragments.register(
            Some("ns"),
            "outer",
            vec![T::text("FROM"), T::include("inner")],
        );
        let template = T::Mixed(vec![
            T::text("SELECT *"),
            T::include("outer").with_property("table", "accounts"),
        ]);
        let composer = QueryComposer::build_with(&template, &fragments, Some("ns")).unwrap();
        assert_eq!(composer.render(&Value::Null).unwrap().sql, "SELECT * FROM accounts");
    }

    #[test]
    fn test_include_errors() {
        let mut fragments = FragmentRegistry::new();
        fragments.register(Some("ns"), "a", vec![T::include("b")]);
        fragments.register(Some("ns"), "b", vec![T::include("a")]);

        let err = QueryComposer::build_with(&T::include("a"), &fragments, Some("ns")).unwrap_err();
        assert_eq!(
            err,
            CompositionError::CircularInclude(vec!["ns.a".into(), "ns.b".into(), "ns.a".into()])
        );

        let err = QueryComposer::build_with(&T::include("zzz"), &fragments, Some("ns")).unwrap_err();
        assert_eq!(err, CompositionError::UnknownFragment("ns.zzz".into()));

        let dup = T::include("a").with_property("x", "1").with_property("x", "2");
        let err = QueryComposer::build_with(&dup, &fragments, Some("ns")).unwrap_err();
        assert_eq!(err, CompositionError::DuplicateIncludeProperty { name: "x".into() });
    }

    #[test]
    fn test_interpolation_is_not_bound() {
        let template = T::text("SELECT * FROM t ORDER BY ${column}");
        let out = QueryComposer::build(&template)
            .unwrap()
            .render(&Value::map([("column", "name")]))
            .unwrap();
        assert_eq!(out.sql, "SELECT * FROM t ORDER BY name");
        assert!(out.bindings.is_empty());
    }

    #[test]
    fn test_bad_expression_fails_at_build() {
        let template = T::if_test("a ==", vec![T::text("x")]);
        assert!(matches!(
            QueryComposer::build(&template).unwrap_err(),
            CompositionError::Expression { .. }
        ));
    }
}
