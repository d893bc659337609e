//! setTimeout backed by the runtime's timer queue.

use std::time::Duration;

use crate::runner::ds::error::EngineError;
use crate::runner::ds::function::NativeFunction;
use crate::runner::ds::operations::type_conversion::to_number;
use crate::runner::ds::value::Value;
use crate::runner::exec::runtime::Runtime;

pub(crate) fn set_timeout(runtime: &Runtime) -> Value {
    let event_loop = runtime.event_loop().clone();
    NativeFunction::new("setTimeout", move |_this, args| {
        let callback = match args.first() {
            Some(Value::Function(f)) => f.clone(),
            _ => {
                return Err(EngineError::Type(
                    "setTimeout expects a function".to_string(),
                ))
            }
        };
        let millis = to_number(args.get(1).unwrap_or(&Value::Number(0.0)));
        let delay = if millis.is_finite() && millis > 0.0 {
            Duration::from_secs_f64(millis / 1000.0)
        } else {
            Duration::ZERO
        };
        let extra: Vec<Value> = args.iter().skip(2).cloned().collect();
        let id = event_loop.schedule_timer(
            delay,
            Box::new(move || callback.call(Value::Undefined, extra).map(|_| ())),
        );
        Ok(Value::Number(id as f64))
    })
}
