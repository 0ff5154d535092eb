// Builtin function registry
//
// Builtins are pure in-process functions with a positional calling
// convention: the engine sorts bound arguments by key name and passes a
// slice. The registry is constructed once and passed by reference into
// dispatch; there is no ambient global table. Lazy argument names and the
// returns-lazy flag are declared here, next to the function they describe.

use std::collections::HashMap;
use std::rc::Rc;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::keys;
use zobject::list;
use zobject::value::{ZMap, ZObject};

pub type BuiltinFn = Rc<dyn Fn(&[ZObject]) -> RuntimeResult<ZObject>>;

#[derive(Clone)]
pub struct BuiltinEntry {
    pub func: BuiltinFn,
    /// Argument key names passed through unevaluated.
    pub lazy_args: Vec<String>,
    /// Whether the return value is a deferred expression the engine must
    /// resolve in the calling frame.
    pub returns_lazy: bool,
}

/// Immutable mapping from builtin identifier to native function.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    entries: HashMap<String, BuiltinEntry>,
}

impl std::fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("BuiltinRegistry").field("ids", &ids).finish()
    }
}

fn expect_arity(args: &[ZObject], n: usize, id: &str) -> RuntimeResult<()> {
    if args.len() != n {
        return Err(ZError::new(
            ErrorKind::ArgumentNotFound,
            format!("{} expects {} arguments, got {}", id, n, args.len()),
        ));
    }
    Ok(())
}

fn expect_boolean(arg: &ZObject, id: &str) -> RuntimeResult<bool> {
    arg.unbox_boolean().ok_or_else(|| {
        ZError::new(
            ErrorKind::ArgumentTypeMismatch,
            format!("{} expects a boolean, got {}", id, arg),
        )
    })
}

fn expect_list<'a>(arg: &'a ZObject, id: &str) -> RuntimeResult<Vec<&'a ZObject>> {
    list::list_items(arg).ok_or_else(|| {
        ZError::new(
            ErrorKind::ArgumentTypeMismatch,
            format!("{} expects a typed list", id),
        )
    })
}

fn unquote(arg: &ZObject) -> &ZObject {
    arg.get(keys::KEY_QUOTE_VALUE).unwrap_or(arg)
}

impl BuiltinRegistry {
    /// The standard builtin set. Registry content is not part of the engine
    /// contract; the calling convention is.
    pub fn standard() -> Self {
        let mut registry = BuiltinRegistry::default();

        // Z801 echo
        registry.register("Z901", |args| {
            expect_arity(args, 1, "Z901")?;
            Ok(args[0].clone())
        });

        // Z802 if: antecedent is eager, both consequents stay deferred and
        // the chosen branch is handed back for resolution in the caller's
        // frame.
        registry.register_full(
            "Z902",
            Rc::new(|args: &[ZObject]| {
                expect_arity(args, 3, "Z902")?;
                let antecedent = expect_boolean(&args[0], "Z902")?;
                Ok(if antecedent {
                    args[1].clone()
                } else {
                    args[2].clone()
                })
            }),
            vec!["Z802K2".to_string(), "Z802K3".to_string()],
            true,
        );

        // Z810 cons
        registry.register("Z910", |args| {
            expect_arity(args, 2, "Z910")?;
            expect_list(&args[1], "Z910")?;
            let list_type = args[1]
                .type_key()
                .cloned()
                .unwrap_or_else(|| list::typed_list_type(ZObject::reference(keys::Z_OBJECT)));
            let mut map = ZMap::new();
            map.insert(keys::TYPE_KEY.to_string(), list_type);
            map.insert(keys::KEY_LIST_HEAD.to_string(), args[0].clone());
            map.insert(keys::KEY_LIST_TAIL.to_string(), args[1].clone());
            Ok(ZObject::Object(map))
        });

        // Z811 head
        registry.register("Z911", |args| {
            expect_arity(args, 1, "Z911")?;
            let items = expect_list(&args[0], "Z911")?;
            items.first().map(|z| (*z).clone()).ok_or_else(|| {
                ZError::new(ErrorKind::ArgumentTypeMismatch, "Z911: head of empty list")
            })
        });

        // Z812 tail
        registry.register("Z912", |args| {
            expect_arity(args, 1, "Z912")?;
            expect_list(&args[0], "Z912")?;
            args[0]
                .get(keys::KEY_LIST_TAIL)
                .cloned()
                .ok_or_else(|| {
                    ZError::new(ErrorKind::ArgumentTypeMismatch, "Z912: tail of empty list")
                })
        });

        // Z813 empty?
        registry.register("Z913", |args| {
            expect_arity(args, 1, "Z913")?;
            let items = expect_list(&args[0], "Z913")?;
            Ok(ZObject::boolean(items.is_empty()))
        });

        // Z844 boolean equality
        registry.register("Z944", |args| {
            expect_arity(args, 2, "Z944")?;
            let a = expect_boolean(&args[0], "Z944")?;
            let b = expect_boolean(&args[1], "Z944")?;
            Ok(ZObject::boolean(a == b))
        });

        // Z866 value equality: structural over normal forms.
        registry.register("Z966", |args| {
            expect_arity(args, 2, "Z966")?;
            Ok(ZObject::boolean(args[0] == args[1]))
        });

        // Z881 typed-list generic: a function call in type position resolves
        // through this to a concrete type descriptor.
        registry.register("Z981", |args| {
            expect_arity(args, 1, "Z981")?;
            let element = args[0].clone();
            let identity = list::typed_list_type(element.clone());

            let key_decl = |key_type: ZObject, id: &str| {
                let mut map = ZMap::new();
                map.insert(
                    keys::TYPE_KEY.to_string(),
                    ZObject::String(keys::Z_KEY_DECL.to_string()),
                );
                map.insert(keys::KEY_KEY_TYPE.to_string(), key_type);
                map.insert(keys::KEY_KEY_ID.to_string(), ZObject::string_box(id));
                ZObject::Object(map)
            };
            let declarations = list::to_typed_list(
                vec![
                    key_decl(element, keys::KEY_LIST_HEAD),
                    key_decl(identity.clone(), keys::KEY_LIST_TAIL),
                ],
                ZObject::reference(keys::Z_KEY_DECL),
            );

            let mut map = ZMap::new();
            map.insert(
                keys::TYPE_KEY.to_string(),
                ZObject::String(keys::Z_TYPE.to_string()),
            );
            map.insert(keys::KEY_TYPE_IDENTITY.to_string(), identity);
            map.insert(keys::KEY_TYPE_KEYS.to_string(), declarations);
            map.insert(
                keys::KEY_TYPE_VALIDATOR.to_string(),
                ZObject::reference("Z831"),
            );
            Ok(ZObject::Object(map))
        });

        // Z106 string type validator (arguments arrive quoted).
        registry.register("Z906", |args| {
            expect_arity(args, 2, "Z906")?;
            let value = unquote(&args[0]);
            match value.unbox_string() {
                Some(_) => Ok(ZObject::boolean(true)),
                None => Err(ZError::new(
                    ErrorKind::ArgumentTypeMismatch,
                    format!("not a string: {}", value),
                )),
            }
        });

        // Z832 non-empty string validator.
        registry.register("Z926", |args| {
            expect_arity(args, 2, "Z926")?;
            let value = unquote(&args[0]);
            match value.unbox_string() {
                Some(s) if !s.is_empty() => Ok(ZObject::boolean(true)),
                Some(_) => Err(ZError::new(
                    ErrorKind::ArgumentTypeMismatch,
                    "Z926: empty string",
                )),
                None => Err(ZError::new(
                    ErrorKind::ArgumentTypeMismatch,
                    format!("not a string: {}", value),
                )),
            }
        });

        // Z140 boolean type validator.
        registry.register("Z940", |args| {
            expect_arity(args, 2, "Z940")?;
            let value = unquote(&args[0]);
            match value.unbox_boolean() {
                Some(_) => Ok(ZObject::boolean(true)),
                None => Err(ZError::new(
                    ErrorKind::ArgumentTypeMismatch,
                    format!("not a boolean: {}", value),
                )),
            }
        });

        // Z831 typed-list validator: cons shape only, element types are the
        // schema layer's concern.
        registry.register("Z931", |args| {
            expect_arity(args, 2, "Z931")?;
            let value = unquote(&args[0]);
            if list::list_items(value).is_some() {
                Ok(ZObject::boolean(true))
            } else {
                Err(ZError::new(
                    ErrorKind::ArgumentTypeMismatch,
                    format!("not a typed list: {}", value),
                ))
            }
        });

        registry
    }

    pub fn register<F>(&mut self, id: &str, func: F)
    where
        F: Fn(&[ZObject]) -> RuntimeResult<ZObject> + 'static,
    {
        self.register_full(id, Rc::new(func), Vec::new(), false);
    }

    pub fn register_full(
        &mut self,
        id: &str,
        func: BuiltinFn,
        lazy_args: Vec<String>,
        returns_lazy: bool,
    ) {
        self.entries.insert(
            id.to_string(),
            BuiltinEntry {
                func,
                lazy_args,
                returns_lazy,
            },
        );
    }

    /// Builder-style registration for fixtures and tests.
    pub fn with_builtin<F>(mut self, id: &str, func: F) -> Self
    where
        F: Fn(&[ZObject]) -> RuntimeResult<ZObject> + 'static,
    {
        self.register(id, func);
        self
    }

    pub fn get(&self, id: &str) -> Option<&BuiltinEntry> {
        self.entries.get(id)
    }

    pub fn lazy_args(&self, id: &str) -> &[String] {
        self.entries
            .get(id)
            .map(|e| e.lazy_args.as_slice())
            .unwrap_or(&[])
    }

    pub fn returns_lazy(&self, id: &str) -> bool {
        self.entries.get(id).map(|e| e.returns_lazy).unwrap_or(false)
    }
}
