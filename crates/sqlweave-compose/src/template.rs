//! Template AST handed to the composer by an external parser
//!
//! Attribute values (tests, collections, bind values) are still raw text
//! here; [`crate::QueryComposer::build`] parses them and resolves includes.

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    If {
        test: String,
        body: Vec<TemplateNode>,
    },
    /// `otherwise` holds every default branch written in the source, so the
    /// builder can reject more than one
    Choose {
        when: Vec<(String, Vec<TemplateNode>)>,
        otherwise: Vec<Vec<TemplateNode>>,
    },
    Foreach(ForeachSpec),
    Trim(TrimSpec),
    Where(Vec<TemplateNode>),
    Set(Vec<TemplateNode>),
    Bind {
        name: String,
        value: String,
    },
    Include {
        refid: String,
        properties: Vec<(String, String)>,
    },
    Mixed(Vec<TemplateNode>),
}

impl TemplateNode {
    pub fn text(text: impl Into<String>) -> Self {
        TemplateNode::Text(text.into())
    }

    pub fn if_test(test: impl Into<String>, body: Vec<TemplateNode>) -> Self {
        TemplateNode::If {
            test: test.into(),
            body,
        }
    }

    pub fn bind(name: impl Into<String>, value: impl Into<String>) -> Self {
        TemplateNode::Bind {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn include(refid: impl Into<String>) -> Self {
        TemplateNode::Include {
            refid: refid.into(),
            properties: Vec::new(),
        }
    }

    /// Add a `<property name=... value=...>` to an include; no-op on other nodes
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let TemplateNode::Include { properties, .. } = &mut self {
            properties.push((name.into(), value.into()));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeachSpec {
    pub collection: String,
    pub item: String,
    pub index: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub separator: Option<String>,
    pub body: Vec<TemplateNode>,
}

impl ForeachSpec {
    pub fn new(collection: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            item: item.into(),
            index: None,
            open: None,
            close: None,
            separator: None,
            body: Vec::new(),
        }
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = Some(open.into());
        self
    }

    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = Some(close.into());
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn body(mut self, body: Vec<TemplateNode>) -> Self {
        self.body = body;
        self
    }
}

impl From<ForeachSpec> for TemplateNode {
    fn from(spec: ForeachSpec) -> Self {
        TemplateNode::Foreach(spec)
    }
}

/// `<trim>` attributes; override lists are `|`-separated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrimSpec {
    pub prefix: Option<String>,
    pub prefix_overrides: Option<String>,
    pub suffix: Option<String>,
    pub suffix_overrides: Option<String>,
    pub body: Vec<TemplateNode>,
}

impl TrimSpec {
    pub fn new(body: Vec<TemplateNode>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn prefix_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.prefix_overrides = Some(overrides.into());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn suffix_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.suffix_overrides = Some(overrides.into());
        self
    }
}

impl From<TrimSpec> for TemplateNode {
    fn from(spec: TrimSpec) -> Self {
        TemplateNode::Trim(spec)
    }
}

/// Split a `|`-separated override list, keeping inner whitespace
pub(crate) fn parse_overrides(list: Option<&str>) -> Vec<String> {
    list.map(|l| {
        l.split('|')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
