use std::fmt;

/// The kinds of definitions that appear in source code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// A namespaced collection of types, functions and values: a Java
    /// package, a Scala object, a C++ namespace.
    Module,
    /// A named type with type, function and value members: a class,
    /// interface, struct.
    Type,
    /// A function, procedure or method.
    Func,
    /// A named value: a field, a struct member, a parameter, a local.
    Value,
    /// A special def used to cope with source code that doesn't line up
    /// with the "code is a nested tree of defs" model.
    Synthetic,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Module,
        Kind::Type,
        Kind::Func,
        Kind::Value,
        Kind::Synthetic,
    ];

    /// Whether defs of this kind may span multiple compilation units, in
    /// which case their member lists are merged across units rather than
    /// replaced.
    pub fn spans_sources(self) -> bool {
        self == Kind::Module
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Module => "MODULE",
            Kind::Type => "TYPE",
            Kind::Func => "FUNC",
            Kind::Value => "VALUE",
            Kind::Synthetic => "SYNTHETIC",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|k| k.name() == name)
    }

    /// A stable small index for table addressing.
    pub fn index(self) -> usize {
        match self {
            Kind::Module => 0,
            Kind::Type => 1,
            Kind::Func => 2,
            Kind::Value => 3,
            Kind::Synthetic => 4,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display refinement of [`Kind`]. The union of the flavors used by all
/// supported languages; a given language uses a subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flavor {
    // module flavors
    Package,
    Namespace,
    // type flavors
    Class,
    Interface,
    AbstractClass,
    Enum,
    Annotation,
    Object,
    AbstractObject,
    TypeParam,
    // func flavors
    Method,
    AbstractMethod,
    StaticMethod,
    Constructor,
    // value flavors
    Field,
    StaticField,
    Param,
    Local,
    /// A flavorless def.
    None,
}

impl Flavor {
    pub const ALL: [Flavor; 19] = [
        Flavor::Package,
        Flavor::Namespace,
        Flavor::Class,
        Flavor::Interface,
        Flavor::AbstractClass,
        Flavor::Enum,
        Flavor::Annotation,
        Flavor::Object,
        Flavor::AbstractObject,
        Flavor::TypeParam,
        Flavor::Method,
        Flavor::AbstractMethod,
        Flavor::StaticMethod,
        Flavor::Constructor,
        Flavor::Field,
        Flavor::StaticField,
        Flavor::Param,
        Flavor::Local,
        Flavor::None,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Flavor::Package => "PACKAGE",
            Flavor::Namespace => "NAMESPACE",
            Flavor::Class => "CLASS",
            Flavor::Interface => "INTERFACE",
            Flavor::AbstractClass => "ABSTRACT_CLASS",
            Flavor::Enum => "ENUM",
            Flavor::Annotation => "ANNOTATION",
            Flavor::Object => "OBJECT",
            Flavor::AbstractObject => "ABSTRACT_OBJECT",
            Flavor::TypeParam => "TYPE_PARAM",
            Flavor::Method => "METHOD",
            Flavor::AbstractMethod => "ABSTRACT_METHOD",
            Flavor::StaticMethod => "STATIC_METHOD",
            Flavor::Constructor => "CONSTRUCTOR",
            Flavor::Field => "FIELD",
            Flavor::StaticField => "STATIC_FIELD",
            Flavor::Param => "PARAM",
            Flavor::Local => "LOCAL",
            Flavor::None => "NONE",
        }
    }

    pub fn from_name(name: &str) -> Option<Flavor> {
        Flavor::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access level of a def. Chiefly used for display and member grouping;
/// relates to `exported` the way [`Flavor`] relates to [`Kind`]. The
/// declaration order here dictates member grouping order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Access {
    Public,
    Protected,
    PackagePrivate,
    Private,
    /// For elements with no access level, i.e. local variables.
    Local,
}

impl Access {
    pub const ALL: [Access; 5] = [
        Access::Public,
        Access::Protected,
        Access::PackagePrivate,
        Access::Private,
        Access::Local,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Access::Public => "PUBLIC",
            Access::Protected => "PROTECTED",
            Access::PackagePrivate => "PACKAGE_PRIVATE",
            Access::Private => "PRIVATE",
            Access::Local => "LOCAL",
        }
    }

    pub fn from_name(name: &str) -> Option<Access> {
        Access::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional directed relations between defs, modeling aspects of
/// languages that don't fit the nested-def hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relation {
    /// The target def is a supertype of the source def.
    Supertype,
    /// The source def inherits from the target def.
    Inherits,
    /// The source def overrides the target def.
    Overrides,
}

impl Relation {
    pub const ALL: [Relation; 3] = [Relation::Supertype, Relation::Inherits, Relation::Overrides];

    pub fn name(self) -> &'static str {
        match self {
            Relation::Supertype => "SUPERTYPE",
            Relation::Inherits => "INHERITS",
            Relation::Overrides => "OVERRIDES",
        }
    }

    pub fn from_name(name: &str) -> Option<Relation> {
        Relation::ALL.into_iter().find(|r| r.name() == name)
    }

    /// A stable small index for table addressing.
    pub fn index(self) -> usize {
        match self {
            Relation::Supertype => 0,
            Relation::Inherits => 1,
            Relation::Overrides => 2,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
