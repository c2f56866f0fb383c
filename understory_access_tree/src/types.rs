// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the accessibility tree: node identifiers, roles, states,
//! attributes, node records, tree-wide metadata, and update batches.

use alloc::{string::String, vec::Vec};
use core::fmt;

use kurbo::{Affine, Rect};

/// Identifier of an accessibility node.
///
/// Ids are chosen by whoever produces [`TreeUpdate`]s. An id is never shared by
/// two live nodes. Negative ids are reserved for nodes synthesized by the engine
/// and are rejected when they appear in an update.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub i32);

impl NodeId {
    /// Returns true for ids in the range reserved for engine-synthesized nodes.
    pub const fn is_reserved(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accessibility role of a node.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Role {
    /// No role has been assigned.
    #[default]
    Unknown,
    /// Top-level window.
    Window,
    /// Root of a web document.
    RootWebArea,
    /// A document.
    Document,
    /// Container with no semantics of its own.
    GenericContainer,
    /// Presentational node (`role="none"`).
    None,
    /// A group of related items.
    Group,
    /// A pane.
    Pane,
    /// A push button.
    Button,
    /// A hyperlink.
    Link,
    /// An image.
    Image,
    /// A heading.
    Heading,
    /// A paragraph.
    Paragraph,
    /// Run of static text.
    StaticText,
    /// A text box inside static text.
    InlineTextBox,
    /// Editable text field.
    TextField,
    /// A check box.
    CheckBox,
    /// Data table.
    Table,
    /// Interactive grid.
    Grid,
    /// Interactive tree grid.
    TreeGrid,
    /// Table used only for layout.
    LayoutTable,
    /// Row of a layout table.
    LayoutTableRow,
    /// Cell of a layout table.
    LayoutTableCell,
    /// Table row.
    Row,
    /// Group of table rows.
    RowGroup,
    /// Table cell.
    Cell,
    /// Interactive grid cell.
    GridCell,
    /// Column header cell.
    ColumnHeader,
    /// Row header cell.
    RowHeader,
    /// Table caption.
    Caption,
    /// A list.
    List,
    /// A list item.
    ListItem,
    /// A list box.
    ListBox,
    /// Option of a list box.
    ListBoxOption,
    /// A tree.
    Tree,
    /// Item of a tree.
    TreeItem,
    /// Group of radio buttons.
    RadioGroup,
    /// A radio button.
    RadioButton,
    /// A menu.
    Menu,
    /// A menu bar.
    MenuBar,
    /// A menu item.
    MenuItem,
    /// A checkable menu item.
    MenuItemCheckBox,
    /// A radio menu item.
    MenuItemRadio,
    /// A tab list.
    TabList,
    /// A tab.
    Tab,
    /// A tab panel.
    TabPanel,
    /// A feed of articles.
    Feed,
    /// An article.
    Article,
}

impl Role {
    /// Table-like containers that own a [`TableInfo`](crate::TableInfo).
    pub fn is_table_like(self) -> bool {
        matches!(
            self,
            Self::Table | Self::Grid | Self::TreeGrid | Self::LayoutTable
        )
    }

    /// Rows of a table-like container.
    pub fn is_table_row(self) -> bool {
        matches!(self, Self::Row | Self::LayoutTableRow)
    }

    /// Cells (including header cells) of a table row.
    pub fn is_cell_or_table_header(self) -> bool {
        matches!(
            self,
            Self::Cell
                | Self::GridCell
                | Self::ColumnHeader
                | Self::RowHeader
                | Self::LayoutTableCell
        )
    }

    /// Roles that are walked through transparently when looking for rows,
    /// cells, or set items.
    pub fn is_pass_through(self) -> bool {
        matches!(self, Self::GenericContainer | Self::None | Self::RowGroup)
    }

    /// Containers whose descendants carry position-in-set and set-size.
    pub fn is_set_like(self) -> bool {
        matches!(
            self,
            Self::List
                | Self::ListBox
                | Self::Tree
                | Self::TreeGrid
                | Self::Menu
                | Self::MenuBar
                | Self::RadioGroup
                | Self::TabList
                | Self::Feed
                | Self::Group
        )
    }

    /// Members of an ordered set.
    pub fn is_item_like(self) -> bool {
        matches!(
            self,
            Self::ListItem
                | Self::ListBoxOption
                | Self::TreeItem
                | Self::MenuItem
                | Self::MenuItemCheckBox
                | Self::MenuItemRadio
                | Self::RadioButton
                | Self::Tab
                | Self::Article
                | Self::Row
        )
    }

    /// Returns true if an item with role `item` belongs to a set with role `self`.
    pub fn set_accepts_item(self, item: Self) -> bool {
        match self {
            Self::List => item == Self::ListItem,
            Self::ListBox => item == Self::ListBoxOption,
            Self::Tree => item == Self::TreeItem,
            Self::TreeGrid => matches!(item, Self::Row | Self::TreeItem),
            Self::Menu | Self::MenuBar => matches!(
                item,
                Self::MenuItem | Self::MenuItemCheckBox | Self::MenuItemRadio
            ),
            Self::RadioGroup => item == Self::RadioButton,
            Self::TabList => item == Self::Tab,
            Self::Feed => item == Self::Article,
            Self::Group => matches!(
                item,
                Self::ListItem
                    | Self::TreeItem
                    | Self::MenuItem
                    | Self::MenuItemCheckBox
                    | Self::MenuItemRadio
                    | Self::RadioButton
            ),
            _ => false,
        }
    }
}

bitflags::bitflags! {
    /// Boolean state flags of a node.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StateFlags: u32 {
        /// Node is hidden from assistive technology. Its children are still
        /// exposed through its nearest unignored ancestor.
        const IGNORED           = 1 << 0;
        /// Node is not rendered.
        const INVISIBLE         = 1 << 1;
        /// Node can take focus.
        const FOCUSABLE         = 1 << 2;
        /// Node is expanded.
        const EXPANDED          = 1 << 3;
        /// Node is collapsed.
        const COLLAPSED         = 1 << 4;
        /// Node is editable.
        const EDITABLE          = 1 << 5;
        /// Node is richly editable.
        const RICHLY_EDITABLE   = 1 << 6;
        /// Node is laid out horizontally.
        const HORIZONTAL        = 1 << 7;
        /// Node is laid out vertically.
        const VERTICAL          = 1 << 8;
        /// Node is a visited link.
        const VISITED           = 1 << 9;
        /// Node is hovered.
        const HOVERED           = 1 << 10;
        /// Node is the default action target.
        const DEFAULT           = 1 << 11;
        /// Node allows multiple selection.
        const MULTISELECTABLE   = 1 << 12;
        /// Node accepts multi-line input.
        const MULTILINE         = 1 << 13;
        /// Node holds protected content (for example a password).
        const PROTECTED         = 1 << 14;
        /// Node requires a value.
        const REQUIRED          = 1 << 15;
    }
}

/// String-valued attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum StringAttribute {
    /// Accessible name.
    Name,
    /// Accessible description.
    Description,
    /// Current value.
    Value,
    /// Placeholder text.
    Placeholder,
    /// Target URL.
    Url,
    /// Source tag name.
    HtmlTag,
    /// Keyboard shortcut.
    KeyShortcuts,
    /// Role description.
    RoleDescription,
    /// Identifier of a child tree hosted by this node.
    ChildTreeId,
}

/// Integer-valued attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum IntAttribute {
    /// Authored row count of a table.
    TableRowCount,
    /// Authored column count of a table.
    TableColumnCount,
    /// Authored index of a table row.
    TableRowIndex,
    /// Authored row index of a cell.
    TableCellRowIndex,
    /// Authored column index of a cell.
    TableCellColumnIndex,
    /// Number of rows a cell spans.
    TableCellRowSpan,
    /// Number of columns a cell spans.
    TableCellColumnSpan,
    /// ARIA row count of a table.
    AriaRowCount,
    /// ARIA column count of a table.
    AriaColumnCount,
    /// ARIA row index of a cell.
    AriaCellRowIndex,
    /// ARIA column index of a cell.
    AriaCellColumnIndex,
    /// Authored position within an ordered set (1-based).
    PosInSet,
    /// Authored size of an ordered set.
    SetSize,
    /// Nesting level of an item (1-based, 0 when unset).
    HierarchicalLevel,
    /// Horizontal scroll offset of a container.
    ScrollX,
    /// Vertical scroll offset of a container.
    ScrollY,
    /// Start of the text selection in a text field.
    TextSelStart,
    /// End of the text selection in a text field.
    TextSelEnd,
    /// Node id of the active descendant.
    ActivedescendantId,
    /// Node id of the error message.
    ErrorMessageId,
    /// Node id of an in-page link target.
    InPageLinkTargetId,
    /// Node id of the group this node belongs to.
    MemberOfId,
    /// Node id this popup was opened for.
    PopupForId,
    /// Node id of the next node on the same line.
    NextOnLineId,
    /// Node id of the previous node on the same line.
    PreviousOnLineId,
}

impl IntAttribute {
    /// Attributes whose value is the id of another node.
    pub fn is_node_id_relation(self) -> bool {
        matches!(
            self,
            Self::ActivedescendantId
                | Self::ErrorMessageId
                | Self::InPageLinkTargetId
                | Self::MemberOfId
                | Self::PopupForId
                | Self::NextOnLineId
                | Self::PreviousOnLineId
        )
    }
}

/// Float-valued attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum FloatAttribute {
    /// Current value of a range widget.
    ValueForRange,
    /// Minimum value of a range widget.
    MinValueForRange,
    /// Maximum value of a range widget.
    MaxValueForRange,
    /// Step of a range widget.
    StepValueForRange,
    /// Font size in pixels.
    FontSize,
    /// Font weight.
    FontWeight,
}

/// Bool-valued attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum BoolAttribute {
    /// Node is busy updating.
    Busy,
    /// Node clips its descendants to its bounds.
    ClipsChildren,
    /// Node is selected.
    Selected,
    /// Node is modal.
    Modal,
    /// Node is the root of a live region.
    LiveAtomic,
    /// Node supports text location queries.
    SupportsTextLocation,
}

/// Integer-list attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum IntListAttribute {
    /// Ids of labelling nodes.
    LabelledbyIds,
    /// Ids of describing nodes.
    DescribedbyIds,
    /// Ids of controlled nodes.
    ControlsIds,
    /// Ids of the next nodes in reading order.
    FlowtoIds,
    /// Ids of detail nodes.
    DetailsIds,
    /// Ids of nodes labelled by this one.
    LabelForIds,
    /// Ids of nodes described by this one.
    DescriptionForIds,
    /// Ids of nodes this one is radio-grouped with.
    RadioGroupIds,
    /// Character offsets of each glyph in a text run.
    CharacterOffsets,
    /// Start offsets of each word in a text run.
    WordStarts,
    /// End offsets of each word in a text run.
    WordEnds,
}

impl IntListAttribute {
    /// Attributes whose values are ids of other nodes.
    pub fn is_node_id_relation(self) -> bool {
        matches!(
            self,
            Self::LabelledbyIds
                | Self::DescribedbyIds
                | Self::ControlsIds
                | Self::FlowtoIds
                | Self::DetailsIds
                | Self::LabelForIds
                | Self::DescriptionForIds
                | Self::RadioGroupIds
        )
    }
}

/// String-list attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum StringListAttribute {
    /// Custom action descriptions.
    CustomActionDescriptions,
    /// Class names from the source document.
    ClassNames,
}

/// Bounds of a node relative to its offset container.
#[derive(Clone, Debug, PartialEq)]
pub struct RelativeBounds {
    /// Container the bounds are relative to. `None` means the parent.
    pub offset_container_id: Option<NodeId>,
    /// Bounds in the offset container's coordinate space.
    pub bounds: Rect,
    /// Optional transform applied to `bounds` before offsetting.
    pub transform: Option<Affine>,
}

impl Default for RelativeBounds {
    fn default() -> Self {
        Self {
            offset_container_id: None,
            bounds: Rect::ZERO,
            transform: None,
        }
    }
}

/// One node record of a [`TreeUpdate`], and the data held by a live node.
///
/// Attribute maps are ordered lists of `(key, value)` pairs. Keys are expected
/// to be unique within a list; lookups return the first match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeData {
    /// Node identifier.
    pub id: NodeId,
    /// Role.
    pub role: Role,
    /// State flags.
    pub state: StateFlags,
    /// String attributes.
    pub string_attributes: Vec<(StringAttribute, String)>,
    /// Int attributes.
    pub int_attributes: Vec<(IntAttribute, i32)>,
    /// Float attributes.
    pub float_attributes: Vec<(FloatAttribute, f32)>,
    /// Bool attributes.
    pub bool_attributes: Vec<(BoolAttribute, bool)>,
    /// Int-list attributes.
    pub int_list_attributes: Vec<(IntListAttribute, Vec<i32>)>,
    /// String-list attributes.
    pub string_list_attributes: Vec<(StringListAttribute, Vec<String>)>,
    /// Ordered child ids.
    pub child_ids: Vec<NodeId>,
    /// Location.
    pub relative_bounds: RelativeBounds,
}

impl NodeData {
    /// Create a record with the given id and role and nothing else.
    pub fn new(id: NodeId, role: Role) -> Self {
        Self {
            id,
            role,
            ..Self::default()
        }
    }

    /// Builder-style helper that sets the child ids.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = NodeId>) -> Self {
        self.child_ids = children.into_iter().collect();
        self
    }

    /// Returns true if the [`StateFlags::IGNORED`] flag is set.
    pub fn is_ignored(&self) -> bool {
        self.state.contains(StateFlags::IGNORED)
    }

    /// Look up a string attribute.
    pub fn string_attribute(&self, attr: StringAttribute) -> Option<&str> {
        self.string_attributes
            .iter()
            .find(|(k, _)| *k == attr)
            .map(|(_, v)| v.as_str())
    }

    /// Look up an int attribute.
    pub fn int_attribute(&self, attr: IntAttribute) -> Option<i32> {
        self.int_attributes
            .iter()
            .find(|(k, _)| *k == attr)
            .map(|(_, v)| *v)
    }

    /// Look up a float attribute.
    pub fn float_attribute(&self, attr: FloatAttribute) -> Option<f32> {
        self.float_attributes
            .iter()
            .find(|(k, _)| *k == attr)
            .map(|(_, v)| *v)
    }

    /// Look up a bool attribute. Missing attributes read as `false`.
    pub fn bool_attribute(&self, attr: BoolAttribute) -> bool {
        self.bool_attributes
            .iter()
            .find(|(k, _)| *k == attr)
            .is_some_and(|(_, v)| *v)
    }

    /// Look up an int-list attribute.
    pub fn int_list_attribute(&self, attr: IntListAttribute) -> Option<&[i32]> {
        self.int_list_attributes
            .iter()
            .find(|(k, _)| *k == attr)
            .map(|(_, v)| v.as_slice())
    }

    /// Look up a string-list attribute.
    pub fn string_list_attribute(&self, attr: StringListAttribute) -> Option<&[String]> {
        self.string_list_attributes
            .iter()
            .find(|(k, _)| *k == attr)
            .map(|(_, v)| v.as_slice())
    }

    /// Set or replace a string attribute.
    pub fn set_string_attribute(&mut self, attr: StringAttribute, value: impl Into<String>) {
        let value = value.into();
        match self.string_attributes.iter_mut().find(|(k, _)| *k == attr) {
            Some(slot) => slot.1 = value,
            None => self.string_attributes.push((attr, value)),
        }
    }

    /// Set or replace an int attribute.
    pub fn set_int_attribute(&mut self, attr: IntAttribute, value: i32) {
        match self.int_attributes.iter_mut().find(|(k, _)| *k == attr) {
            Some(slot) => slot.1 = value,
            None => self.int_attributes.push((attr, value)),
        }
    }

    /// Set or replace a float attribute.
    pub fn set_float_attribute(&mut self, attr: FloatAttribute, value: f32) {
        match self.float_attributes.iter_mut().find(|(k, _)| *k == attr) {
            Some(slot) => slot.1 = value,
            None => self.float_attributes.push((attr, value)),
        }
    }

    /// Set or replace a bool attribute.
    pub fn set_bool_attribute(&mut self, attr: BoolAttribute, value: bool) {
        match self.bool_attributes.iter_mut().find(|(k, _)| *k == attr) {
            Some(slot) => slot.1 = value,
            None => self.bool_attributes.push((attr, value)),
        }
    }

    /// Set or replace an int-list attribute.
    pub fn set_int_list_attribute(&mut self, attr: IntListAttribute, value: Vec<i32>) {
        match self.int_list_attributes.iter_mut().find(|(k, _)| *k == attr) {
            Some(slot) => slot.1 = value,
            None => self.int_list_attributes.push((attr, value)),
        }
    }

    /// Set or replace a string-list attribute.
    pub fn set_string_list_attribute(&mut self, attr: StringListAttribute, value: Vec<String>) {
        match self
            .string_list_attributes
            .iter_mut()
            .find(|(k, _)| *k == attr)
        {
            Some(slot) => slot.1 = value,
            None => self.string_list_attributes.push((attr, value)),
        }
    }
}

/// Affinity of a text selection endpoint.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TextAffinity {
    /// Attach to the character after the offset.
    #[default]
    Downstream,
    /// Attach to the character before the offset.
    Upstream,
}

/// Tree-wide metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeData {
    /// Identifier of this tree.
    pub tree_id: Option<String>,
    /// Identifier of the tree hosting this one.
    pub parent_tree_id: Option<String>,
    /// Document title.
    pub title: String,
    /// Focused node.
    pub focus_id: Option<NodeId>,
    /// Whether the document is paginated.
    pub paginated: bool,
    /// Selection runs from focus to anchor.
    pub sel_is_backward: bool,
    /// Selection anchor node.
    pub sel_anchor_object_id: Option<NodeId>,
    /// Selection anchor offset (child index or character offset).
    pub sel_anchor_offset: i32,
    /// Selection anchor affinity.
    pub sel_anchor_affinity: TextAffinity,
    /// Selection focus node.
    pub sel_focus_object_id: Option<NodeId>,
    /// Selection focus offset (child index or character offset).
    pub sel_focus_offset: i32,
    /// Selection focus affinity.
    pub sel_focus_affinity: TextAffinity,
}

/// A transactional description of a new tree state.
///
/// Node records are applied in order. A record for a node must come after the
/// record of the parent that introduces it, unless the node is the new root.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeUpdate {
    /// Replacement tree-wide metadata. `None` leaves the current metadata alone.
    pub tree_data: Option<TreeData>,
    /// Node whose children are wholly replaced by this update. If it is the
    /// current root and `root_id` names a different node, the whole tree is
    /// replaced.
    pub node_id_to_clear: Option<NodeId>,
    /// Root after the update. Defaults to the current root, or to the first
    /// node record when the tree is empty.
    pub root_id: Option<NodeId>,
    /// Node records.
    pub nodes: Vec<NodeData>,
}
