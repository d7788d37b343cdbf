use anyhow::anyhow;

/// Connectivity represents the "connected" state of an in-memory driven port and provides
/// common behavior for returning an error if the port is configured to be in a disconnected state.
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl Connectivity {
    /// Return an error if connectivity is in a "disconnected" state
    pub fn blow_up_if_disconnected(&self) -> Result<(), anyhow::Error> {
        match self {
            Self::Connected => Ok(()),
            Self::Disconnected => Err(anyhow!("could not connect to the store!")),
        }
    }
}

/// FakeImplementation stands in for a single function on a mocked driving port. It records the
/// arguments of every call and hands back a preconfigured result.
///
/// * [Args] is the tuple of captured arguments
/// * [Ret] is the function's return type
///
/// Mocks wrap their FakeImplementations in a [std::sync::Mutex] so calls through `&self`
/// can still record arguments:
///
/// ```ignore
/// impl TaskPort for Mutex<MockTaskService> {
///     async fn delete_task(&self, user_id: Uuid, task_id: Uuid, ...) -> Result<(), TaskError> {
///         let mut locked_self = self.lock().expect("mock task service mutex poisoned");
///         locked_self.delete_task_result.save_arguments((user_id, task_id));
///         locked_self.delete_task_result.return_value_result()
///     }
/// }
/// ```
pub struct FakeImplementation<Args, Ret> {
    saved_arguments: Vec<Args>,
    return_value: Option<Ret>,
}

impl<Args, Ret> FakeImplementation<Args, Ret> {
    pub fn new() -> FakeImplementation<Args, Ret> {
        FakeImplementation {
            saved_arguments: Vec::new(),
            return_value: None,
        }
    }

    /// Saves arguments from a single invocation of the FakeImplementation
    pub fn save_arguments(&mut self, arguments: Args) {
        self.saved_arguments.push(arguments)
    }

    /// Returns the list of arguments passed on every call to this FakeImplementation
    pub fn calls(&self) -> &[Args] {
        self.saved_arguments.as_slice()
    }
}

impl<Args, Success, Fail> FakeImplementation<Args, Result<Success, Fail>>
where
    Success: Clone,
    Fail: Clone,
{
    /// Set the result handed back on every invocation
    pub fn set_returned_result(&mut self, return_value: Result<Success, Fail>) {
        self.return_value = Some(return_value)
    }

    /// Retrieve a copy of the configured result
    pub fn return_value_result(&self) -> Result<Success, Fail> {
        match self.return_value {
            Some(Ok(ref ok_result)) => Ok(ok_result.clone()),
            Some(Err(ref err)) => Err(err.clone()),
            None => panic!("Tried to return from a function where the return value wasn't set!"),
        }
    }
}
