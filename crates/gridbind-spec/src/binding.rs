use serde::{Deserialize, Serialize};

/// Default worksheet used when a binding does not name one.
pub const DEFAULT_SHEET: &str = "Sheet1";

fn default_sheet() -> String {
    DEFAULT_SHEET.to_string()
}

/// All cell bindings declared for one mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeBinding {
    /// Name the mapped type reports through its schema.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Worksheet the type is written to and read from.
    #[serde(default = "default_sheet")]
    pub sheet: String,
    /// Scalar property bindings, in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    /// Collection bindings, in declaration order.
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
}

impl TypeBinding {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            sheet: default_sheet(),
            properties: Vec::new(),
            collections: Vec::new(),
        }
    }

    pub fn sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = sheet.into();
        self
    }

    /// Bind `property` to a single cell.
    pub fn property(mut self, property: impl Into<String>, cell: impl Into<String>) -> Self {
        self.properties.push(PropertySpec::new(property).cell(cell));
        self
    }

    pub fn with_property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Bind `property` to a vertical collection starting at `start`.
    pub fn collection(mut self, property: impl Into<String>, start: impl Into<String>) -> Self {
        self.collections.push(CollectionSpec::vertical(property, start));
        self
    }

    pub fn with_collection(mut self, spec: CollectionSpec) -> Self {
        self.collections.push(spec);
        self
    }

    pub fn find_property(&self, property: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.property == property)
    }

    pub fn find_collection(&self, property: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|c| c.property == property)
    }
}

/// Binding of one scalar property to one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySpec {
    /// Property identifier as exposed by the type's schema.
    pub property: String,
    /// A1 address of the cell. Required; absence is reported at compile time.
    #[serde(default)]
    pub cell: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    /// Formula text; `{row}` is replaced by the row the cell lands on.
    #[serde(default)]
    pub formula: Option<String>,
}

impl PropertySpec {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            cell: None,
            format: None,
            formula: None,
        }
    }

    pub fn cell(mut self, cell: impl Into<String>) -> Self {
        self.cell = Some(cell.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }
}

/// Direction a collection grows in. Only `Vertical` is supported; the other
/// variants exist so historical manifests deserialize and can be rejected
/// with a precise error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Vertical,
    Horizontal,
    Grid,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Layout::Vertical => "vertical",
            Layout::Horizontal => "horizontal",
            Layout::Grid => "grid",
        })
    }
}

/// Binding of a collection property to a growing cell region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSpec {
    pub property: String,
    /// A1 address of the first item's anchor cell.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub layout: Layout,
    /// Blank rows left between consecutive items.
    #[serde(default)]
    pub row_spacing: u32,
    /// Optional item type name, checked against the schema when present.
    #[serde(default)]
    pub item_type: Option<String>,
    /// Name of the nested type whose own binding lays out each item.
    #[serde(default)]
    pub nested: Option<String>,
    /// Format applied to simple (scalar) items.
    #[serde(default)]
    pub format: Option<String>,
}

impl CollectionSpec {
    pub fn vertical(property: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            start: Some(start.into()),
            layout: Layout::Vertical,
            row_spacing: 0,
            item_type: None,
            nested: None,
            format: None,
        }
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn row_spacing(mut self, rows: u32) -> Self {
        self.row_spacing = rows;
        self
    }

    pub fn item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn nested(mut self, type_name: impl Into<String>) -> Self {
        self.nested = Some(type_name.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}
