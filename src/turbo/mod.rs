mod core;

pub use self::core::{
    Package, PackageContext, TurboModuleContext, TurboModuleError, TurboModuleProvider,
    TurboModuleRef, TurboModulesFactory,
};
