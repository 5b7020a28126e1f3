#[derive(Debug, Clone)]
pub struct SingleTrigger {
    pub trigger: triggers::Trigger,
    pub listener: triggers::Listener,
}

impl SingleTrigger {
    pub fn new() -> SingleTrigger {
        let (trigger, listener) = triggers::trigger();
        SingleTrigger { trigger, listener }
    }
}

impl Default for SingleTrigger {
    fn default() -> Self {
        Self::new()
    }
}
