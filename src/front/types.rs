//! The closed set of semantic types Penguin programs can use.

use derive_more::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Type {
    #[display("int")]
    Int,
    #[display("string")]
    String,
    #[display("void")]
    Void,
    #[display("tileset")]
    Tileset,
    #[display("tilemap")]
    Tilemap,
    #[display("sprite")]
    Sprite,
    #[display("oamentry")]
    OamEntry,
    #[display("list<int>")]
    ListInt,
}

impl Type {
    /// Parses a type keyword's text into a `Type`, as used for declarations
    /// and procedure parameter/return types.
    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "int" => Type::Int,
            "string" => Type::String,
            "void" => Type::Void,
            "tileset" => Type::Tileset,
            "tilemap" => Type::Tilemap,
            "sprite" => Type::Sprite,
            "oamentry" => Type::OamEntry,
            "list" => Type::ListInt,
            _ => return None,
        })
    }

    /// Can this type be indexed with `[i]`, and if so, what does indexing
    /// yield?
    pub fn index_result(self) -> Option<Type> {
        match self {
            Type::ListInt | Type::Tileset | Type::Tilemap => Some(Type::Int),
            _ => None,
        }
    }

    /// The type of a named attribute on this type, if it has one.
    pub fn attr_type(self, attr: &str) -> Option<Type> {
        match self {
            Type::OamEntry => match attr {
                "x" | "y" | "tile" => Some(Type::Int),
                _ => None,
            },
            _ => None,
        }
    }

    /// May a value of `from` be used to initialise a variable declared with
    /// this type? Covers the one asymmetric case in the language: binary
    /// assets are spelled as string literals but declared as
    /// `tileset`/`tilemap`/`sprite`.
    pub fn accepts_init(self, from: Type) -> bool {
        if self == from {
            return true;
        }
        matches!((self, from), (Type::Tileset | Type::Tilemap | Type::Sprite, Type::String))
    }

    /// Is this type one of the scalar hardware-backed binary-asset types
    /// whose variables may only ever be initialised once?
    pub fn is_binary_asset(self) -> bool {
        matches!(self, Type::Tileset | Type::Tilemap | Type::Sprite)
    }
}
